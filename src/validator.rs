use crate::account::Address;
use crate::block::ValidatorKey;
use crate::error::{Error, Result};

fn idx_for_block(block_number: u64, count: usize) -> usize {
    (block_number % count as u64) as usize
}

/// Round robin: block n pays its fees to `validators[n % len]`.
pub fn leader(validators: &[ValidatorKey], block_number: u64) -> Result<Address> {
    if validators.is_empty() {
        return Err(Error::UnknownValidatorSet);
    }
    let index = idx_for_block(block_number, validators.len());
    validators[index]
        .address()
        .map_err(|e| Error::AddressDerivation { index, source: Box::new(e) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Keypair;

    fn set(n: usize) -> (Vec<Keypair>, Vec<ValidatorKey>) {
        let kps = (0..n).map(|_| Keypair::gen()).collect::<Vec<_>>();
        let keys = kps.iter().map(|kp| kp.public().into()).collect();
        (kps, keys)
    }

    #[test]
    fn periodic() {
        for count in 1..=5 {
            let (_, keys) = set(count);
            for k in 0..20u64 {
                assert_eq!(
                    leader(&keys, k).unwrap(),
                    leader(&keys, k + count as u64).unwrap()
                );
            }
        }
    }

    #[test]
    fn rotates() {
        let (kps, keys) = set(3);
        assert_eq!(leader(&keys, 1).unwrap(), kps[1].address());
        assert_eq!(leader(&keys, 2).unwrap(), kps[2].address());
        assert_eq!(leader(&keys, 3).unwrap(), kps[0].address());
    }

    #[test]
    fn empty() {
        assert!(matches!(leader(&[], 1), Err(Error::UnknownValidatorSet)));
    }

    #[test]
    fn bad_key() {
        let (_, mut keys) = set(2);
        keys[1] = ValidatorKey(vec![9u8; 5]);
        assert!(leader(&keys, 0).is_ok());
        assert!(matches!(leader(&keys, 1), Err(Error::AddressDerivation { index: 1, .. })));
    }
}
