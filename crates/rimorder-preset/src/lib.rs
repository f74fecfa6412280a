//! Shareable mod-list codes: `RMM:v1:<urlsafe-base64(zlib(json))>`.
//!
//! A preset names an ordered mod list plus light metadata. This crate only
//! moves that shape in and out of the token format; ordering logic lives in
//! `rimorder-core`.

use std::io::{Read as _, Write as _};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const PRESET_PREFIX: &str = "RMM";
pub const PRESET_VERSION: u32 = 1;

/// Payload uses one-letter keys and omits empty metadata to keep codes
/// short; the package-id list is always present, even empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(rename = "n", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "p", default)]
    pub package_ids: Vec<String>,
    #[serde(rename = "w", default, skip_serializing_if = "Vec::is_empty")]
    pub workshop_ids: Vec<String>,
    #[serde(rename = "t", default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(rename = "d", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "a", default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub game_version: String,
}

#[derive(Debug, Serialize)]
pub struct PresetStats {
    pub name: String,
    pub mod_count: usize,
    pub workshop_count: usize,
    pub created_at: String,
    pub author: String,
    pub code_length: usize,
}

pub fn encode(preset: &Preset) -> Result<String> {
    let json = serde_json::to_vec(preset).context("encode preset payload")?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .context("compress preset payload")?;
    let compressed = encoder.finish().context("finish preset compression")?;
    let b64 = URL_SAFE.encode(compressed);
    Ok(format!("{PRESET_PREFIX}:v{PRESET_VERSION}:{b64}"))
}

pub fn decode(code: &str) -> Result<Preset> {
    let code = code.trim();
    let mut parts = code.splitn(3, ':');
    let (Some(prefix), Some(version), Some(payload)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("invalid preset code format (expected {PRESET_PREFIX}:v<N>:<data>)");
    };
    if prefix != PRESET_PREFIX {
        bail!("invalid preset code prefix: {prefix:?}");
    }
    let Some(version) = version.strip_prefix('v') else {
        bail!("invalid preset version field: {version:?}");
    };
    let version: u32 = version
        .parse()
        .with_context(|| format!("invalid preset version number: {version:?}"))?;
    if version > PRESET_VERSION {
        // Newer payloads with unknown fields still parse; try anyway.
        warn!(
            version,
            supported = PRESET_VERSION,
            "preset code is newer than this build supports"
        );
    }

    let compressed = URL_SAFE
        .decode(payload)
        .context("decode preset base64 payload")?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .context("decompress preset payload")?;
    let mut preset: Preset = serde_json::from_slice(&json).context("parse preset payload")?;
    if preset.name.is_empty() {
        preset.name = "Imported Preset".to_string();
    }
    Ok(preset)
}

/// Human-readable verdict without surfacing an error to the caller.
pub fn validate(code: &str) -> (bool, String) {
    let code = code.trim();
    if code.is_empty() {
        return (false, "empty preset code".to_string());
    }
    match decode(code) {
        Err(err) => (false, format!("{err:#}")),
        Ok(preset) if preset.package_ids.is_empty() && preset.workshop_ids.is_empty() => {
            (false, "preset contains no mods".to_string())
        }
        Ok(preset) => (
            true,
            format!("valid preset: {} mods", preset.package_ids.len()),
        ),
    }
}

pub fn stats(code: &str) -> Result<PresetStats> {
    let preset = decode(code)?;
    Ok(PresetStats {
        name: preset.name,
        mod_count: preset.package_ids.len(),
        workshop_count: preset.workshop_ids.len(),
        created_at: preset.created_at,
        author: preset.author,
        code_length: code.trim().len(),
    })
}
