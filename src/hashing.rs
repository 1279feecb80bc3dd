//! Content digests.
//!
//! Each configured algorithm runs as its own rayon task over an independent
//! reader of the same input. Digest nodes are named with `ni:` URIs, so
//! equal content shares one hash node.

use crate::context::{AnalysisContext, CancellationToken};
use crate::error::Result;
use crate::graph::{Node, Term};
use crate::input::Input;
use crate::types::HashAlgorithm;
use crate::vocab::{Class, Property};
use base64::Engine as _;
use rayon::prelude::*;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io::Read;

const CHUNK: usize = 64 * 1024;

fn run<D: Digest>(input: &Input, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut reader = input.reader();
    let mut buf = vec![0u8; CHUNK];
    loop {
        cancel.checkpoint()?;
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Digest of the whole input.
pub fn digest(input: &Input, algorithm: HashAlgorithm, cancel: &CancellationToken) -> Result<Vec<u8>> {
    match algorithm {
        HashAlgorithm::Sha224 => run::<Sha224>(input, cancel),
        HashAlgorithm::Sha256 => run::<Sha256>(input, cancel),
        HashAlgorithm::Sha384 => run::<Sha384>(input, cancel),
        HashAlgorithm::Sha512 => run::<Sha512>(input, cancel),
    }
}

/// Digests for several algorithms, computed concurrently.
pub fn digests(
    input: &Input,
    algorithms: &[HashAlgorithm],
    cancel: &CancellationToken,
) -> Result<Vec<(HashAlgorithm, Vec<u8>)>> {
    algorithms
        .par_iter()
        .map(|&algorithm| digest(input, algorithm, cancel).map(|d| (algorithm, d)))
        .collect()
}

/// `ni:` URI (RFC 6920) naming a digest.
pub fn ni_uri(algorithm: HashAlgorithm, digest: &[u8]) -> String {
    format!(
        "ni:///{};{}",
        algorithm.uri_name(),
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Attach a hash node per configured algorithm to `node`.
///
/// Inputs above the configured size limit are not hashed.
pub fn describe(node: &Node, input: &Input, cx: &AnalysisContext) -> Result<()> {
    let options = cx.options();
    if options.hash_algorithms.is_empty() || input.len() > options.hash_size_limit {
        return Ok(());
    }

    for (algorithm, value) in digests(input, &options.hash_algorithms, cx.cancel())? {
        let hash = cx.factory().create_uri(&ni_uri(algorithm, &value));
        hash.set_class(Class::FileHash);
        hash.set(Property::HashAlgorithm, Term::literal(algorithm.name()));
        hash.set(Property::HashValue, Term::hex_binary(&value));
        node.set(Property::HasHash, hash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let token = CancellationToken::new();
        let value = digest(&Input::from_slice(b"abc"), HashAlgorithm::Sha256, &token).unwrap();
        assert_eq!(
            hex::encode(&value),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parallel_digests_keep_order() {
        let token = CancellationToken::new();
        let input = Input::from_slice(&[7u8; 200_000]);
        let all = digests(&input, &HashAlgorithm::ALL, &token).unwrap();
        let lengths: Vec<usize> = all.iter().map(|(_, d)| d.len()).collect();
        assert_eq!(lengths, vec![28, 32, 48, 64]);
    }

    #[test]
    fn test_ni_uri() {
        assert_eq!(
            ni_uri(HashAlgorithm::Sha256, &[0xFB, 0xFF]),
            "ni:///sha-256;-_8"
        );
    }

    #[test]
    fn test_cancelled_digest() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(digest(&Input::from_slice(b"abc"), HashAlgorithm::Sha512, &token).is_err());
    }
}
