// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.


use super::{greeting, CloudFunction, InputSet};
use crate::error::Result;
use crate::payload::{from_event, to_event, HelloReply, HelloRequest};
use async_trait::async_trait;
use log::debug;
use openssl::symm::{encrypt, Cipher};
use rand::distributions::Uniform;
use rand::Rng;
use serde_json::Value;

/// The 128-bit key of the workload.
pub const KEY: [u8; 16] = [
    0xa1, 0xf6, 0x25, 0x8c, 0x87, 0x7d, 0x5f, 0xcd, 0x89, 0x64, 0x48, 0x45, 0x38, 0xbf, 0xc9, 0x2c,
];

/// Length of the encrypted messages.
pub const MESSAGE_LEN: usize = 100;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Returns `len` random lowercase letters and digits.
pub fn random_message(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let dist = Uniform::from(0..ALPHABET.len());
    (0..len)
        .map(|_| ALPHABET[rng.sample(dist)] as char)
        .collect()
}

/// Encrypts `plaintext` with AES-128 in counter mode, the counter block
/// starting at 1.
pub fn encrypt_ctr(key: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>> {
    let iv = 1_u128.to_be_bytes();
    Ok(encrypt(Cipher::aes_128_ctr(), key, Some(&iv), plaintext)?)
}

/// Encrypts one of two random messages per request.
#[derive(Debug, Clone)]
pub struct Aes {
    record: String,
    replay: String,
}

impl Aes {
    /// Creates the function with two fresh messages.
    pub fn new() -> Self {
        Self {
            record: random_message(MESSAGE_LEN),
            replay: random_message(MESSAGE_LEN),
        }
    }
}

#[async_trait]
impl CloudFunction for Aes {
    fn name(&self) -> &str {
        "aes"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: HelloRequest = from_event(event)?;
        let message = match InputSet::of(&request) {
            InputSet::Replay => &self.replay,
            _ => &self.record,
        };
        let ciphertext = encrypt_ctr(&KEY, message.as_bytes())?;
        debug!("Encrypted {} bytes", ciphertext.len());

        to_event(&HelloReply {
            message: greeting(&request.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::symm::decrypt;
    use serde_json::json;

    #[test]
    fn messages_use_the_alphabet() {
        let message = random_message(MESSAGE_LEN);
        assert_eq!(MESSAGE_LEN, message.len());
        assert!(message
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn counter_starts_at_one() -> Result<()> {
        // Encrypting zeros yields the keystream, whose first block is the
        // block cipher applied to the counter value 1.
        let stream = encrypt_ctr(&KEY, &[0u8; 16])?;
        let block = encrypt(Cipher::aes_128_ecb(), &KEY, None, &1_u128.to_be_bytes())?;
        assert_eq!(&block[..16], &stream[..]);

        let iv = 1_u128.to_be_bytes();
        let ciphertext = encrypt_ctr(&KEY, b"hello")?;
        let plain = decrypt(Cipher::aes_128_ctr(), &KEY, Some(&iv), &ciphertext)?;
        assert_eq!(b"hello".to_vec(), plain);
        Ok(())
    }

    #[tokio::test]
    async fn replies_with_greeting() -> Result<()> {
        let f = Aes::new();
        let reply = f.invoke(json!({"name": "replay"})).await?;
        assert_eq!("Hello, replay_response!", reply["message"]);
        Ok(())
    }
}
