//! Profile arithmetic shared by the engine registry and the built-in codec.
//!
//! All functions are pure; every returned value is already clamped to the
//! range the target tool accepts.

use crate::config::Profile;

/// Upper bound of gifsicle's `--lossy`
pub const MAX_GIF_LOSSY: u32 = 200;
/// Lower bound of the GIF palette size after profile scaling
pub const MIN_GIF_COLORS: u32 = 16;

/// Quality after the profile shift (Balanced −10, Strong −18, floor 8), clamped to 1..=100
pub fn adjust_quality(quality: u8, profile: Profile) -> u8 {
    let quality = i32::from(quality);
    let adjusted = match profile {
        Profile::High => quality,
        Profile::Balanced => (quality - 10).max(8),
        Profile::Strong => (quality - 18).max(8),
    };
    adjusted.clamp(1, 100) as u8
}

/// pngquant `--quality MIN-MAX` and `--speed` for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngquantSettings {
    pub min_quality: u8,
    pub max_quality: u8,
    pub speed: u8,
}

impl PngquantSettings {
    pub fn quality_range(&self) -> String {
        format!("{}-{}", self.min_quality, self.max_quality)
    }
}

pub fn pngquant_settings(quality: u8, profile: Profile) -> PngquantSettings {
    let (range_size, speed) = match profile {
        Profile::High => (8, 1),
        Profile::Balanced => (15, 2),
        Profile::Strong => (25, 3),
    };
    // pngquant rejects very low ceilings, keep the range above 10
    let max_quality = adjust_quality(quality, profile).max(10);
    let min_quality = max_quality.saturating_sub(range_size).max(10);
    PngquantSettings {
        min_quality,
        max_quality,
        speed,
    }
}

/// Optimisation level for oxipng (`-o N`)
pub fn oxipng_level(profile: Profile) -> u8 {
    match profile {
        Profile::High => 2,
        Profile::Balanced => 4,
        Profile::Strong => 6,
    }
}

/// Optimisation level for optipng (`-oN`)
pub fn optipng_level(profile: Profile) -> u8 {
    match profile {
        Profile::High => 2,
        Profile::Balanced => 5,
        Profile::Strong => 7,
    }
}

/// gifsicle `--lossy` and `--colors`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifLossy {
    pub lossy: u32,
    pub colors: u32,
}

impl GifLossy {
    /// Harsher parameters for the retry after a lossy run that did not shrink
    pub fn amplified(&self) -> Self {
        Self {
            lossy: ((self.lossy as f64 * 1.5) as u32).clamp(1, MAX_GIF_LOSSY),
            colors: ((self.colors as f64 * 0.75) as u32).max(MIN_GIF_COLORS),
        }
    }
}

pub fn gif_lossy(quality: u8, profile: Profile) -> GifLossy {
    let quality = u32::from(adjust_quality(quality, profile));

    let lossy = (100 - quality) * 2;
    let lossy = match profile {
        Profile::High => lossy,
        Profile::Balanced => (lossy as f64 * 1.1) as u32,
        Profile::Strong => (lossy as f64 * 1.4) as u32,
    }
    .min(MAX_GIF_LOSSY);

    let colors = (256 * quality / 100).max(32);
    let colors = match profile {
        Profile::High => colors,
        Profile::Balanced => ((colors as f64 * 0.85) as u32).max(MIN_GIF_COLORS),
        Profile::Strong => ((colors as f64 * 0.7) as u32).max(MIN_GIF_COLORS),
    };

    GifLossy { lossy, colors }
}

/// JPEG quality used by the built-in encoder
pub fn builtin_jpeg_quality(quality: u8, profile: Profile, lossless: bool) -> u8 {
    if lossless {
        100
    } else {
        adjust_quality(quality, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_quality() {
        assert_eq!(adjust_quality(85, Profile::Strong), 67);
        assert_eq!(adjust_quality(85, Profile::Balanced), 75);
        assert_eq!(adjust_quality(85, Profile::High), 85);
        assert_eq!(adjust_quality(12, Profile::Strong), 8);
        assert_eq!(adjust_quality(1, Profile::High), 1);
        assert_eq!(adjust_quality(100, Profile::High), 100);
    }

    #[test]
    fn test_pngquant_settings() {
        let high = pngquant_settings(80, Profile::High);
        assert_eq!(high, PngquantSettings { min_quality: 72, max_quality: 80, speed: 1 });
        assert_eq!(high.quality_range(), "72-80");

        let strong = pngquant_settings(80, Profile::Strong);
        assert_eq!(strong.max_quality, 62);
        assert_eq!(strong.min_quality, 37);
        assert_eq!(strong.speed, 3);

        let low = pngquant_settings(15, Profile::Balanced);
        assert_eq!(low.min_quality, 10);
        assert_eq!(low.max_quality, 10);
    }

    #[test]
    fn test_gif_lossy_grows_with_profile() {
        let high = gif_lossy(80, Profile::High);
        assert_eq!(high, GifLossy { lossy: 40, colors: 204 });

        let strong = gif_lossy(80, Profile::Strong);
        assert!(strong.lossy > high.lossy);
        assert!(strong.colors < high.colors);

        let floor = gif_lossy(1, Profile::Strong);
        assert_eq!(floor.lossy, MAX_GIF_LOSSY);
        assert!(floor.colors >= MIN_GIF_COLORS);
    }

    #[test]
    fn test_amplified_retry_parameters() {
        let base = GifLossy { lossy: 40, colors: 204 };
        assert_eq!(base.amplified(), GifLossy { lossy: 60, colors: 153 });

        let capped = GifLossy { lossy: 180, colors: 20 }.amplified();
        assert_eq!(capped.lossy, MAX_GIF_LOSSY);
        assert_eq!(capped.colors, MIN_GIF_COLORS);
    }

    #[test]
    fn test_levels() {
        assert!(oxipng_level(Profile::High) < oxipng_level(Profile::Strong));
        assert_eq!(optipng_level(Profile::Strong), 7);
        assert_eq!(builtin_jpeg_quality(80, Profile::Strong, true), 100);
        assert_eq!(builtin_jpeg_quality(80, Profile::Strong, false), 62);
    }
}
