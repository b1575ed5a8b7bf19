//! Request body construction and the signed payload sent on every attempt.

use std::io::{self, Write};

use dropgate_sftp::FileRecord;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

use crate::error::{DeliveryError, DeliveryResult};
use crate::signing::sign;

/// One file entry in the downstream batch body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    /// Profile code applied to every file.
    #[serde(rename = "profileName")]
    pub profile_name: String,
    /// Backup path the file was claimed into.
    pub sftp_document_path: String,
    /// Checksum placeholder; always empty.
    #[serde(rename = "MD5_checksum")]
    pub md5_checksum: String,
    /// Static flag.
    pub rotate_pages: bool,
    /// Static flag.
    pub skip_text: bool,
}

impl BatchItem {
    /// Build the entry for a claimed file.
    #[must_use]
    pub fn new(profile_code: &str, record: &FileRecord) -> Self {
        Self {
            profile_name: profile_code.to_string(),
            sftp_document_path: record.backup_path.clone(),
            md5_checksum: String::new(),
            rotate_pages: false,
            skip_text: false,
        }
    }
}

/// Body posted to the downstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryEnvelope<'a> {
    /// Files in this batch, in claim order.
    pub batch: Vec<BatchItem>,
    /// Submitting actor.
    pub uploaded_by: &'a str,
    /// Submission channel.
    pub source: &'a str,
}

impl<'a> DeliveryEnvelope<'a> {
    /// Build the envelope for `records`.
    #[must_use]
    pub fn new(
        profile_code: &str,
        records: &[FileRecord],
        uploaded_by: &'a str,
        source: &'a str,
    ) -> Self {
        Self {
            batch: records
                .iter()
                .map(|record| BatchItem::new(profile_code, record))
                .collect(),
            uploaded_by,
            source,
        }
    }

    /// Compact, ASCII-only JSON form that is signed and sent verbatim.
    ///
    /// Characters outside printable ASCII are written as `\uXXXX` escapes, with
    /// surrogate pairs above the basic multilingual plane, so the bytes match
    /// what the receiver recomputes when it verifies the signature.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Serialize`] if serialisation fails.
    pub fn canonical_body(&self) -> DeliveryResult<String> {
        let mut body = Vec::with_capacity(128 * (self.batch.len() + 1));
        let mut serializer = Serializer::with_formatter(&mut body, AsciiFormatter);
        self.serialize(&mut serializer)
            .map_err(|source| DeliveryError::Serialize { source })?;
        String::from_utf8(body).map_err(|source| DeliveryError::Encoding { source })
    }
}

/// Compact formatter that escapes every non-printable-ASCII character.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..index])?;
            let mut units = [0_u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Body, timestamp, and signature fixed once per batch and reused on every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Canonical JSON body.
    pub body: String,
    /// Unix timestamp (seconds) the signature was computed for.
    pub timestamp: u64,
    /// Hex HMAC-SHA256 over `"{timestamp}.{body}"`.
    pub signature: String,
}

impl SignedPayload {
    /// Sign `envelope` with `secret` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialised or the key is rejected.
    pub fn new(envelope: &DeliveryEnvelope<'_>, secret: &str, timestamp: u64) -> DeliveryResult<Self> {
        let body = envelope.canonical_body()?;
        let signature = sign(secret, timestamp, &body)?;
        Ok(Self {
            body,
            timestamp,
            signature,
        })
    }

    /// Seconds elapsed between signing and `now`.
    #[must_use]
    pub const fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}
