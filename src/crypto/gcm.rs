//! Chunked AES-128-GCM transform
//!
//! The `aes-gcm` crate only exposes one-shot AEAD over a full in-memory
//! buffer, which rules it out for multi-gigabyte volume files. This module
//! assembles the same NIST SP 800-38D construction from its RustCrypto
//! parts: AES-CTR (32-bit big-endian counter) over the data, GHASH over the
//! ciphertext, tag = E(K, J0) XOR GHASH. State is carried across chunks, so
//! callers can push a fixed-size buffer at a time.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes128;
use ghash::universal_hash::UniversalHash;
use ghash::GHash;

use crate::crypto::keys::{SessionKey, NONCE_SIZE};

/// Size of the AEAD authentication tag in bytes (the maximum GCM allows)
pub const TAG_SIZE: usize = 16;

const BLOCK_SIZE: usize = 16;

type Aes128Ctr32 = ctr::Ctr32BE<Aes128>;

/// Incremental AES-128-GCM state for one file
pub(crate) struct GcmStream {
    ctr: Aes128Ctr32,
    ghash: GHash,
    encrypted_j0: [u8; BLOCK_SIZE],
    partial: [u8; BLOCK_SIZE],
    partial_len: usize,
    ciphertext_len: u64,
}

impl GcmStream {
    pub(crate) fn new(key: &SessionKey, nonce: &[u8; NONCE_SIZE]) -> Self {
        let aes = Aes128::new(GenericArray::from_slice(key.as_bytes()));

        // GHASH subkey H = E(K, 0^128)
        let mut subkey = GenericArray::default();
        aes.encrypt_block(&mut subkey);
        let ghash = GHash::new(&subkey);

        // J0 = nonce || 0x00000001 for 96-bit nonces
        let mut j0 = [0u8; BLOCK_SIZE];
        j0[..NONCE_SIZE].copy_from_slice(nonce);
        j0[BLOCK_SIZE - 1] = 1;

        let mut encrypted_j0 = GenericArray::clone_from_slice(&j0);
        aes.encrypt_block(&mut encrypted_j0);

        // Data blocks start at inc32(J0)
        let mut initial_counter = j0;
        initial_counter[BLOCK_SIZE - 1] = 2;
        let ctr = Aes128Ctr32::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&initial_counter),
        );

        Self {
            ctr,
            ghash,
            encrypted_j0: encrypted_j0.into(),
            partial: [0u8; BLOCK_SIZE],
            partial_len: 0,
            ciphertext_len: 0,
        }
    }

    /// Encrypt one chunk of plaintext in place
    pub(crate) fn encrypt_chunk(&mut self, data: &mut [u8]) {
        self.ctr.apply_keystream(data);
        self.absorb(data);
    }

    /// Decrypt one chunk of ciphertext in place
    pub(crate) fn decrypt_chunk(&mut self, data: &mut [u8]) {
        self.absorb(data);
        self.ctr.apply_keystream(data);
    }

    /// Feed ciphertext into GHASH, buffering any trailing partial block
    fn absorb(&mut self, mut data: &[u8]) {
        self.ciphertext_len += data.len() as u64;

        if self.partial_len > 0 {
            let take = (BLOCK_SIZE - self.partial_len).min(data.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
            self.partial_len += take;
            data = &data[take..];

            if self.partial_len == BLOCK_SIZE {
                self.ghash
                    .update(&[GenericArray::clone_from_slice(&self.partial)]);
                self.partial_len = 0;
            }
        }

        let full = data.len() - data.len() % BLOCK_SIZE;
        for block in data[..full].chunks_exact(BLOCK_SIZE) {
            self.ghash.update(&[GenericArray::clone_from_slice(block)]);
        }

        let rest = &data[full..];
        if !rest.is_empty() {
            self.partial[..rest.len()].copy_from_slice(rest);
            self.partial_len = rest.len();
        }
    }

    /// Finish the stream and produce the authentication tag
    pub(crate) fn finish(mut self) -> [u8; TAG_SIZE] {
        if self.partial_len > 0 {
            self.partial[self.partial_len..].fill(0);
            self.ghash
                .update(&[GenericArray::clone_from_slice(&self.partial)]);
        }

        // Length block: 64-bit AAD bit count (always zero here) || 64-bit
        // ciphertext bit count
        let mut lengths = [0u8; BLOCK_SIZE];
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        self.ghash
            .update(&[GenericArray::clone_from_slice(&lengths)]);

        let mut tag: [u8; TAG_SIZE] = self.ghash.finalize().into();
        for (tag_byte, mask) in tag.iter_mut().zip(self.encrypted_j0.iter()) {
            *tag_byte ^= mask;
        }
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // NIST GCM test case 1: all-zero key and nonce, empty plaintext
    #[test]
    fn test_nist_vector_empty_plaintext() {
        let key = SessionKey::from_bytes([0u8; 16]);
        let nonce = [0u8; 12];
        let tag = GcmStream::new(&key, &nonce).finish();
        assert_eq!(hex(&tag), "58e2fccefa7e3061367f1d57a4e7455a");
    }

    // NIST GCM test case 2: all-zero key, nonce, and one zero block
    #[test]
    fn test_nist_vector_single_block() {
        let key = SessionKey::from_bytes([0u8; 16]);
        let nonce = [0u8; 12];

        let mut stream = GcmStream::new(&key, &nonce);
        let mut block = [0u8; 16];
        stream.encrypt_chunk(&mut block);

        assert_eq!(hex(&block), "0388dace60b6a392f328c2b971b2fe78");
        assert_eq!(hex(&stream.finish()), "ab6e47d42cec13bdf53a67b21257bdff");
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let key_bytes = [0x42u8; 16];
        let nonce = [7u8; 12];
        let plaintext: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();

        let mut whole = plaintext.clone();
        let mut stream = GcmStream::new(&SessionKey::from_bytes(key_bytes), &nonce);
        stream.encrypt_chunk(&mut whole);
        let whole_tag = stream.finish();

        // Same data pushed in awkward, non-block-aligned pieces
        let mut pieces = plaintext.clone();
        let mut stream = GcmStream::new(&SessionKey::from_bytes(key_bytes), &nonce);
        let (a, rest) = pieces.split_at_mut(7);
        let (b, c) = rest.split_at_mut(500);
        stream.encrypt_chunk(a);
        stream.encrypt_chunk(b);
        stream.encrypt_chunk(c);
        let pieces_tag = stream.finish();

        assert_eq!(whole, pieces);
        assert_eq!(whole_tag, pieces_tag);
    }

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let key = [0x13u8; 16];
        let nonce = [9u8; 12];
        let plaintext = b"This is a very simple test message!".to_vec();

        let mut data = plaintext.clone();
        let mut stream = GcmStream::new(&SessionKey::from_bytes(key), &nonce);
        stream.encrypt_chunk(&mut data);
        let tag = stream.finish();

        let mut stream = GcmStream::new(&SessionKey::from_bytes(key), &nonce);
        stream.decrypt_chunk(&mut data);
        assert_eq!(stream.finish(), tag);
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_tampered_ciphertext_changes_tag() {
        let key = [0x13u8; 16];
        let nonce = [9u8; 12];

        let mut data = b"This is a very simple test message!".to_vec();
        let mut stream = GcmStream::new(&SessionKey::from_bytes(key), &nonce);
        stream.encrypt_chunk(&mut data);
        let tag = stream.finish();

        data[4] ^= 42;
        let mut stream = GcmStream::new(&SessionKey::from_bytes(key), &nonce);
        stream.decrypt_chunk(&mut data);
        assert_ne!(stream.finish(), tag);
    }
}
