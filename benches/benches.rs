use criterion::{criterion_group, criterion_main};


criterion_group!(benches, crypto::sigs, ledger::apply);
criterion_main!(benches);
