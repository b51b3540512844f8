//! Render hash — a SHA-256 digest over every input that shapes the audio.
//!
//! Identical (spec, configs, asset paths, seed, target duration, commit)
//! always produce the same hash, so it works as a cache key and as
//! embedded output metadata. Inputs are canonically serialized: structs via
//! serde_json (field order is declaration order, maps are BTreeMaps) with
//! a length-prefixed frame per field so adjacent fields can never alias.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::song::{MixConfig, SongSpec, StyleConfig};

/// Everything that feeds the digest.
pub struct RenderHashInput<'a> {
    pub spec: &'a SongSpec,
    pub mix: &'a MixConfig,
    pub style: &'a StyleConfig,
    /// (instrument, asset path/label) pairs in deterministic order.
    pub asset_paths: &'a [(String, String)],
    pub seed: u64,
    pub target_minutes: Option<f64>,
    /// Source commit or build identifier.
    pub commit: &'a str,
}

fn frame<T: Serialize>(hasher: &mut Sha256, label: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    hasher.update(label.as_bytes());
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(&bytes);
    Ok(())
}

/// Compute the hex render hash.
pub fn render_hash(input: &RenderHashInput<'_>) -> Result<String> {
    let mut hasher = Sha256::new();
    frame(&mut hasher, "spec", input.spec)?;
    frame(&mut hasher, "mix", input.mix)?;
    frame(&mut hasher, "style", input.style)?;
    frame(&mut hasher, "assets", &input.asset_paths)?;
    frame(&mut hasher, "seed", &input.seed)?;
    frame(&mut hasher, "target", &input.target_minutes)?;
    frame(&mut hasher, "commit", &input.commit)?;

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}
