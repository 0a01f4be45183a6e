use criterion::{Criterion, criterion_group, criterion_main};
use sha3::{Digest, Keccak256};
use std::hint::black_box;

use hexary_trie::{NodeStore, RefCountDB, StackTrie, Trie, TrieCommitter};

/// Deterministic 32-byte keys so runs are comparable.
fn keys(count: usize) -> Vec<Vec<u8>> {
    (0..count as u64)
        .map(|i| Keccak256::digest(i.to_be_bytes()).to_vec())
        .collect()
}

fn insert_and_hash(c: &mut Criterion) {
    let keys = keys(1_000);
    c.bench_function("trie insert+hash 1k", |b| {
        b.iter(|| {
            let mut trie = Trie::stateless();
            for key in &keys {
                trie.insert(key.clone(), key.clone()).unwrap();
            }
            black_box(trie.hash_no_commit())
        })
    });
}

fn stack_trie_sorted(c: &mut Criterion) {
    let mut keys = keys(1_000);
    keys.sort();
    c.bench_function("stack trie 1k sorted", |b| {
        b.iter(|| {
            let trie = StackTrie::new();
            for key in &keys {
                trie.update(key.clone(), key.clone()).unwrap();
            }
            black_box(trie.hash().unwrap())
        })
    });
}

fn get_from_committed(c: &mut Criterion) {
    let keys = keys(1_000);
    let store = NodeStore::new();
    let committer = TrieCommitter::new(RefCountDB::new(store.clone()));
    let mut trie = Trie::new(Box::new(store.clone()));
    for key in &keys {
        trie.insert(key.clone(), key.clone()).unwrap();
    }
    let (root, _) = committer.commit(&mut trie).unwrap();
    let trie = Trie::open(Box::new(store), root);

    c.bench_function("resolvable get 1k", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(trie.get(key).unwrap());
            }
        })
    });
}

fn prove_and_verify(c: &mut Criterion) {
    let keys = keys(256);
    let mut trie = Trie::stateless();
    for key in &keys {
        trie.insert(key.clone(), key.clone()).unwrap();
    }
    let root = trie.hash_no_commit();

    c.bench_function("prove+verify 256", |b| {
        b.iter(|| {
            for key in &keys {
                let proof = trie.get_proof(key).unwrap();
                black_box(hexary_trie::verify_proof(root, key, &proof).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    insert_and_hash,
    stack_trie_sorted,
    get_from_committed,
    prove_and_verify
);
criterion_main!(benches);
