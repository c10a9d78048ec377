//! 归档存储格式
//!
//! 归档服务保存的是 `zstd(nonce || AES-GCM(json))`：写入时先加密再压缩，
//! 读取时先解压再解密。密钥为原始字节，长度 16、24 或 32 对应 AES-128/192/256。

use aes_gcm::{
    aead::{consts::U12, Aead, AeadCore, KeyInit, OsRng},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use async_compression::tokio::{bufread::ZstdDecoder, write::ZstdEncoder};
use erasure_core::{ErasureError, ErasureResult};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_LEN: usize = 12;

pub const INCOMPATIBLE_FORMAT: &str = "transcript format incompatible with cleaning";

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn seal(&self, nonce: &Nonce<U12>, plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Cipher::Aes128(cipher) => cipher.encrypt(nonce, plaintext),
            Cipher::Aes192(cipher) => cipher.encrypt(nonce, plaintext),
            Cipher::Aes256(cipher) => cipher.encrypt(nonce, plaintext),
        }
    }

    fn open(&self, nonce: &Nonce<U12>, ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Cipher::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            Cipher::Aes192(cipher) => cipher.decrypt(nonce, ciphertext),
            Cipher::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
    }
}

/// 归档工单的编解码器
pub struct TranscriptCodec {
    cipher: Cipher,
}

impl TranscriptCodec {
    pub fn new(key: &[u8]) -> ErasureResult<Self> {
        let cipher = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Cipher::Aes128),
            24 => Aes192Gcm::new_from_slice(key).map(Cipher::Aes192),
            32 => Aes256Gcm::new_from_slice(key).map(Cipher::Aes256),
            len => {
                return Err(ErasureError::Configuration(format!(
                    "archiver AES key must be 16, 24 or 32 bytes, got {len}"
                )))
            }
        }
        .map_err(|e| ErasureError::Configuration(format!("invalid archiver AES key: {e}")))?;

        Ok(Self { cipher })
    }

    /// 编码为归档服务接受的导入格式
    pub async fn encode(&self, transcript: &Value) -> ErasureResult<Vec<u8>> {
        let plaintext = serde_json::to_vec(transcript)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .seal(&nonce, &plaintext)
            .map_err(|e| ErasureError::Archive(format!("failed to encrypt transcript: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        compress(&sealed)
            .await
            .map_err(|e| ErasureError::Archive(format!("failed to compress transcript: {e}")))
    }

    /// 解码归档内容，任何一步失败都视为格式不兼容
    pub async fn decode(&self, data: &[u8]) -> ErasureResult<Value> {
        let sealed = decompress(data).await.map_err(|e| incompatible("decompress", &e))?;
        if sealed.len() < NONCE_LEN {
            return Err(incompatible("decrypt", &"payload shorter than nonce"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .open(Nonce::<U12>::from_slice(nonce), ciphertext)
            .map_err(|e| incompatible("decrypt", &e))?;

        serde_json::from_slice(&plaintext).map_err(|e| incompatible("parse", &e))
    }
}

fn incompatible(stage: &str, cause: &dyn std::fmt::Display) -> ErasureError {
    warn!(stage = stage, "Failed to decode archived transcript: {}", cause);
    ErasureError::Archive(INCOMPATIBLE_FORMAT.to_string())
}

async fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZstdEncoder::new(Vec::new());
    encoder.write_all(data).await?;
    encoder.shutdown().await?;
    Ok(encoder.into_inner())
}

async fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZstdDecoder::new(data);
    let mut output = Vec::new();
    decoder.read_to_end(&mut output).await?;
    Ok(output)
}
