//! Parsers for externally supplied private keys

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use zeroize::Zeroizing;

use filvault_core::{types::base64_bytes, DerivationScheme, KeyInfo};

use crate::error::{Result, VaultError};

/// Accepted key encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    /// Hex of the JSON key info (what `export` prints)
    #[default]
    HexLotus,
    /// The JSON key info itself
    JsonLotus,
    /// go-filecoin wallet export: `{"KeyInfo": [{"PrivateKey", "SigType"}]}`
    GfcJson,
}

impl KeyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::HexLotus => "hex-lotus",
            KeyFormat::JsonLotus => "json-lotus",
            KeyFormat::GfcJson => "gfc-json",
        }
    }

    /// Decode `input` into a key info. Surrounding whitespace is ignored.
    pub fn parse(&self, input: &[u8]) -> Result<KeyInfo> {
        let text = std::str::from_utf8(input)
            .map_err(|_| VaultError::InvalidKeyFormat("input is not UTF-8".to_string()))?
            .trim();
        match self {
            KeyFormat::HexLotus => KeyInfo::from_hex(text)
                .map_err(|e| VaultError::InvalidKeyFormat(format!("hex-lotus: {}", e))),
            KeyFormat::JsonLotus => KeyInfo::from_json(text.as_bytes())
                .map_err(|e| VaultError::InvalidKeyFormat(format!("json-lotus: {}", e))),
            KeyFormat::GfcJson => parse_gfc_json(text),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hex-lotus" => Ok(KeyFormat::HexLotus),
            "json-lotus" => Ok(KeyFormat::JsonLotus),
            "gfc-json" => Ok(KeyFormat::GfcJson),
            other => Err(VaultError::InvalidKeyFormat(format!(
                "unrecognized format '{}'",
                other
            ))),
        }
    }
}

#[derive(Deserialize)]
struct GfcExport {
    #[serde(rename = "KeyInfo")]
    key_info: Vec<GfcKey>,
}

#[derive(Deserialize)]
struct GfcKey {
    #[serde(rename = "PrivateKey", with = "base64_bytes")]
    private_key: Vec<u8>,
    #[serde(rename = "SigType")]
    sig_type: u8,
}

fn parse_gfc_json(text: &str) -> Result<KeyInfo> {
    let export: GfcExport = serde_json::from_str(text)
        .map_err(|e| VaultError::InvalidKeyFormat(format!("gfc-json: {}", e)))?;
    let first = export
        .key_info
        .into_iter()
        .next()
        .ok_or_else(|| VaultError::InvalidKeyFormat("gfc-json: no keys".to_string()))?;
    let private_key = Zeroizing::new(first.private_key);
    let scheme = DerivationScheme::from_sig_type(first.sig_type)?;
    Ok(KeyInfo::new(scheme, private_key.to_vec()))
}
