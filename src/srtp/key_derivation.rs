
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{Error, Result};

pub(crate) const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub(crate) const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
pub(crate) const LABEL_SRTP_SALT: u8 = 0x02;
pub(crate) const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub(crate) const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
pub(crate) const LABEL_SRTCP_SALT: u8 = 0x05;

pub(crate) const SRTCP_INDEX_SIZE: usize = 4;

/// AES-CM PRF of RFC 3711 section 4.3.1 with key derivation rate zero: the
/// master salt is XOR-ed with the label at byte 7, a 16-bit block counter
/// fills the last two bytes, and each block is AES-encrypted with the master
/// key until `out_len` bytes are produced.
pub(crate) fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    out_len: usize,
) -> Result<Vec<u8>> {
    if master_key.len() != 16 {
        return Err(Error::ErrBadMasterKeyLength {
            expect: 16,
            got: master_key.len(),
        });
    }
    if master_salt.len() != 14 {
        return Err(Error::ErrBadMasterSaltLength {
            expect: 14,
            got: master_salt.len(),
        });
    }

    let block = Aes128::new(GenericArray::from_slice(master_key));

    let mut prf_in = [0u8; 16];
    prf_in[..master_salt.len()].copy_from_slice(master_salt);
    prf_in[7] ^= label;

    let mut out = vec![0u8; (out_len + 15) / 16 * 16];
    for (i, n) in (0..out_len).step_by(16).enumerate() {
        prf_in[14..16].copy_from_slice(&(i as u16).to_be_bytes());
        let chunk = GenericArray::from_mut_slice(&mut out[n..n + 16]);
        chunk.copy_from_slice(&prf_in);
        block.encrypt_block(chunk);
    }
    out.truncate(out_len);
    Ok(out)
}

/// IV of RFC 3711 section 4.1.1:
/// `(k_s * 2^16) XOR (ssrc * 2^64) XOR (i * 2^16)` with `i = 2^16*ROC + SEQ`.
pub(crate) fn generate_counter(
    sequence_number: u16,
    rollover_counter: u32,
    ssrc: u32,
    session_salt: &[u8],
) -> [u8; 16] {
    let mut counter = [0u8; 16];
    counter[4..8].copy_from_slice(&ssrc.to_be_bytes());
    counter[8..12].copy_from_slice(&rollover_counter.to_be_bytes());
    counter[12..14].copy_from_slice(&sequence_number.to_be_bytes());
    for (i, &b) in session_salt.iter().enumerate() {
        counter[i] ^= b;
    }
    counter
}
