use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, FontVec};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

/// Hangul-capable system fonts, most preferred first
pub const FONT_CANDIDATES: &[&str] = &[
    // macOS
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "/System/Library/Fonts/Supplemental/AppleGothic.ttf",
    "/Library/Fonts/NanumGothic.ttf",
    // Windows
    "C:\\Windows\\Fonts\\malgun.ttf",
    "C:\\Windows\\Fonts\\gulim.ttc",
    // Linux
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
    "/usr/share/fonts/nanum/NanumGothic.ttf",
    // Last resort, no Hangul
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

/// Loads `explicit` if given, otherwise the first readable candidate
pub fn load_font(explicit: Option<&Path>) -> Result<FontArc> {
    if let Some(path) = explicit {
        return font_from_file(path);
    }

    for candidate in FONT_CANDIDATES.iter().map(PathBuf::from) {
        if !candidate.exists() {
            continue;
        }
        match font_from_file(&candidate) {
            Ok(font) => return Ok(font),
            Err(err) => debug!(error = %err, "skipping font candidate"),
        }
    }
    Err(anyhow!(
        "no usable font found; pass --font with a Hangul-capable TTF/OTF/TTC file"
    ))
}

fn font_from_file(path: &Path) -> Result<FontArc> {
    let data = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    // Index 0 covers both single fonts and the first face of a collection
    let font = FontVec::try_from_vec_and_index(data, 0)
        .map_err(|err| anyhow!("{}: {err}", path.display()))?;

    if font.glyph_id('가').0 == 0 {
        warn!(font = %path.display(), "font has no Hangul glyphs");
    } else {
        info!(font = %path.display(), "font loaded");
    }
    Ok(FontArc::new(font))
}
