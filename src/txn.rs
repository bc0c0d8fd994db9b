use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::account::{self, Address, Keypair, PublicKey, Signature};
use crate::error::{Error, Result};

pub type Hash = [u8; 32];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    #[serde(with = "account::hex_pk")]
    pub pub_key: PublicKey,
    #[serde(default, with = "account::hex_sig", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

// Everything but the signature, in a fixed field order.
#[derive(Serialize)]
struct Signable<'a> {
    from: &'a Address,
    to: &'a Address,
    amount: u64,
    fee: u64,
    pub_key: String,
}

impl Transaction {
    pub fn new(from: &Keypair, to: Address, amount: u64, fee: u64) -> Self {
        Self {
            from: from.address(),
            to,
            amount,
            fee,
            pub_key: from.public(),
            signature: None,
        }
    }

    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&Signable {
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            fee: self.fee,
            pub_key: hex::encode(self.pub_key.as_bytes()),
        })?)
    }

    /// Digest of the whole transaction, signature included.
    pub fn hash(&self) -> Result<Hash> {
        Ok(Sha256::digest(serde_json::to_vec(self)?).into())
    }

    /// What the sender pays: amount plus fee.
    pub fn cost(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }
}

/// Returns a signed copy, the input is left alone.
pub fn sign(txn: &Transaction, kp: &Keypair) -> Result<Transaction> {
    let bytes = txn.signable_bytes()?;
    let mut signed = txn.clone();
    signed.signature = Some(kp.sign(&bytes));
    Ok(signed)
}

pub fn verify(txn: &Transaction) -> bool {
    check(txn).is_ok()
}

/// Like `verify` but says what is wrong.
pub fn check(txn: &Transaction) -> Result<()> {
    let sig = txn.signature.as_ref().ok_or(Error::MissingSignature)?;
    if account::verify(&txn.pub_key, &txn.signable_bytes()?, sig) {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn transfer(from: &Keypair, to: &Keypair, amount: u64, fee: u64) -> Transaction {
        sign(&Transaction::new(from, to.address(), amount, fee), from).unwrap()
    }

    #[test]
    fn sign_then_verify() {
        let alice = Keypair::gen();
        let bob = Keypair::gen();
        let unsigned = Transaction::new(&alice, bob.address(), 100, 10);
        let signed = sign(&unsigned, &alice).unwrap();
        assert!(unsigned.signature.is_none());
        assert!(verify(&signed));
        assert!(matches!(check(&unsigned), Err(Error::MissingSignature)));
    }

    #[test]
    fn tamper() {
        let alice = Keypair::gen();
        let bob = Keypair::gen();
        let carol = Keypair::gen();
        let signed = transfer(&alice, &bob, 100, 10);

        let mut txn = signed.clone();
        txn.amount += 1;
        assert!(!verify(&txn));

        let mut txn = signed.clone();
        txn.fee = 0;
        assert!(!verify(&txn));

        let mut txn = signed.clone();
        txn.to = carol.address();
        assert!(!verify(&txn));

        let mut txn = signed.clone();
        txn.from = carol.address();
        assert!(!verify(&txn));

        let mut txn = signed.clone();
        txn.pub_key = carol.public();
        assert!(matches!(check(&txn), Err(Error::InvalidSignature)));
    }

    #[test]
    fn wrong_signer() {
        let alice = Keypair::gen();
        let bob = Keypair::gen();
        // Signed by bob but claims alice's key.
        let txn = sign(&Transaction::new(&alice, bob.address(), 1, 1), &bob).unwrap();
        assert!(!verify(&txn));
    }

    #[test]
    fn hash_covers_signature() {
        let alice = Keypair::gen();
        let bob = Keypair::gen();
        let unsigned = Transaction::new(&alice, bob.address(), 5, 1);
        let signed = sign(&unsigned, &alice).unwrap();
        assert_ne!(unsigned.hash().unwrap(), signed.hash().unwrap());
        assert_eq!(signed.hash().unwrap(), signed.clone().hash().unwrap());
        let json = serde_json::to_string(&signed).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert!(verify(&back));
    }
}
