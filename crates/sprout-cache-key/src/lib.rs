pub use digest::{digest, hash_digest};
pub use stable_hash::StableHasher;

mod digest;
mod stable_hash;
