use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

use super::key_derivation::*;
use super::SrtpProfile;

type HmacSha1 = Hmac<Sha1>;
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// AES-128 counter mode with HMAC-SHA1 authentication, the two profiles the
/// DTLS use_srtp negotiation can land on (80 and 32-bit RTP tags; the RTCP
/// tag stays at 80 bits for both).
pub(crate) struct CipherAesCmHmacSha1 {
    profile: SrtpProfile,

    srtp_session_key: Vec<u8>,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: HmacSha1,

    srtcp_session_key: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: HmacSha1,
}

impl CipherAesCmHmacSha1 {
    pub fn new(profile: SrtpProfile, master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        let srtp_session_key =
            aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, master_key, master_salt, 16)?;
        let srtp_session_salt =
            aes_cm_key_derivation(LABEL_SRTP_SALT, master_key, master_salt, 14)?;
        let srtp_auth_key =
            aes_cm_key_derivation(LABEL_SRTP_AUTHENTICATION_TAG, master_key, master_salt, 20)?;

        let srtcp_session_key =
            aes_cm_key_derivation(LABEL_SRTCP_ENCRYPTION, master_key, master_salt, 16)?;
        let srtcp_session_salt =
            aes_cm_key_derivation(LABEL_SRTCP_SALT, master_key, master_salt, 14)?;
        let srtcp_auth_key =
            aes_cm_key_derivation(LABEL_SRTCP_AUTHENTICATION_TAG, master_key, master_salt, 20)?;

        let srtp_session_auth = HmacSha1::new_from_slice(&srtp_auth_key)
            .map_err(|e| Error::Other(e.to_string()))?;
        let srtcp_session_auth = HmacSha1::new_from_slice(&srtcp_auth_key)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(CipherAesCmHmacSha1 {
            profile,
            srtp_session_key,
            srtp_session_salt,
            srtp_session_auth,
            srtcp_session_key,
            srtcp_session_salt,
            srtcp_session_auth,
        })
    }

    pub fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    pub fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    /// RFC 3711 section 4.2: HMAC over the authenticated portion followed by
    /// the rollover counter, truncated by the caller to the profile tag size.
    fn generate_srtp_auth_tag(&self, buf: &[u8], roc: u32) -> [u8; 20] {
        let mut signer = self.srtp_session_auth.clone();
        signer.update(buf);
        signer.update(&roc.to_be_bytes());
        signer.finalize().into_bytes().into()
    }

    fn generate_srtcp_auth_tag(&self, buf: &[u8]) -> [u8; 20] {
        let mut signer = self.srtcp_session_auth.clone();
        signer.update(buf);
        signer.finalize().into_bytes().into()
    }

    fn apply_keystream(key: &[u8], counter: &[u8; 16], data: &mut [u8]) {
        let mut stream = Aes128Ctr::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(counter),
        );
        stream.apply_keystream(data);
    }

    /// Verifies the auth tag, then decrypts the payload in place. Returns
    /// the authenticated length (packet minus tag).
    pub fn decrypt_rtp_in_place(
        &self,
        packet: &mut [u8],
        header_len: usize,
        sequence_number: u16,
        ssrc: u32,
        roc: u32,
    ) -> Result<usize> {
        let tag_len = self.rtp_auth_tag_len();
        if packet.len() < header_len + tag_len {
            return Err(Error::ErrSrtpTooSmall);
        }
        let cipher_end = packet.len() - tag_len;

        let expected = self.generate_srtp_auth_tag(&packet[..cipher_end], roc);
        let actual = &packet[cipher_end..];
        if actual.ct_eq(&expected[..tag_len]).unwrap_u8() != 1 {
            return Err(Error::ErrFailedToVerifyAuthTag);
        }

        let counter = generate_counter(sequence_number, roc, ssrc, &self.srtp_session_salt);
        Self::apply_keystream(
            &self.srtp_session_key,
            &counter,
            &mut packet[header_len..cipher_end],
        );
        Ok(cipher_end)
    }

    /// Encrypts an RTP payload and appends the auth tag. Only exercised from
    /// tests; the media plane is receive-only.
    #[cfg(test)]
    pub fn encrypt_rtp(
        &self,
        plaintext: &[u8],
        header_len: usize,
        sequence_number: u16,
        ssrc: u32,
        roc: u32,
    ) -> Result<Vec<u8>> {
        let mut out = plaintext.to_vec();
        let counter = generate_counter(sequence_number, roc, ssrc, &self.srtp_session_salt);
        Self::apply_keystream(&self.srtp_session_key, &counter, &mut out[header_len..]);
        let tag = self.generate_srtp_auth_tag(&out, roc);
        out.extend_from_slice(&tag[..self.rtp_auth_tag_len()]);
        Ok(out)
    }

    /// Verifies and decrypts a full SRTCP packet in place. Returns the
    /// plaintext RTCP length (packet minus E/index word and tag).
    pub fn decrypt_rtcp_in_place(&self, packet: &mut [u8]) -> Result<(usize, u32)> {
        let tag_len = self.rtcp_auth_tag_len();
        if packet.len() < 8 + SRTCP_INDEX_SIZE + tag_len {
            return Err(Error::ErrSrtcpTooSmall);
        }
        let tail_offset = packet.len() - (tag_len + SRTCP_INDEX_SIZE);
        let index_word = u32::from_be_bytes([
            packet[tail_offset],
            packet[tail_offset + 1],
            packet[tail_offset + 2],
            packet[tail_offset + 3],
        ]);
        let is_encrypted = index_word & (1 << 31) != 0;
        let index = index_word & !(1 << 31);

        let auth_end = packet.len() - tag_len;
        let expected = self.generate_srtcp_auth_tag(&packet[..auth_end]);
        let actual = &packet[auth_end..];
        if actual.ct_eq(&expected[..tag_len]).unwrap_u8() != 1 {
            return Err(Error::ErrFailedToVerifyRtcpAuthTag);
        }

        if is_encrypted {
            let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
            let counter = generate_counter(
                index as u16,
                index >> 16,
                ssrc,
                &self.srtcp_session_salt,
            );
            Self::apply_keystream(
                &self.srtcp_session_key,
                &counter,
                &mut packet[8..tail_offset],
            );
        }
        Ok((tail_offset, index))
    }

    /// Encrypts an outbound RTCP compound and appends the E/index word and
    /// auth tag.
    pub fn encrypt_rtcp(&self, plaintext: &[u8], index: u32) -> Result<Vec<u8>> {
        if plaintext.len() < 8 {
            return Err(Error::ErrRtcpTooSmall);
        }
        let mut out = Vec::with_capacity(
            plaintext.len() + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len(),
        );
        out.extend_from_slice(plaintext);

        let ssrc = u32::from_be_bytes([out[4], out[5], out[6], out[7]]);
        let counter = generate_counter(index as u16, index >> 16, ssrc, &self.srtcp_session_salt);
        Self::apply_keystream(&self.srtcp_session_key, &counter, &mut out[8..]);

        out.extend_from_slice(&(index | (1 << 31)).to_be_bytes());
        let tag = self.generate_srtcp_auth_tag(&out);
        out.extend_from_slice(&tag[..self.rtcp_auth_tag_len()]);
        Ok(out)
    }
}
