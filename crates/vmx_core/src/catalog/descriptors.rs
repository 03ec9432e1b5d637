//! Built-in operation descriptors.
//!
//! The full transformation catalog as static data. Descriptors are
//! declared grouped by category; that declaration order is the stable
//! catalog order used for default job planning.

use serde::{Deserialize, Serialize};

use super::params::{ParamKind, ParamSpec};

/// Fixed set of catalog categories, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    BasicEditing,
    VisualEnhancement,
    AiDedup,
    AudioOther,
    StrongDedup,
    VisionBased,
    NewMaterial,
    Laboratory,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 8] = [
        Category::BasicEditing,
        Category::VisualEnhancement,
        Category::AiDedup,
        Category::AudioOther,
        Category::StrongDedup,
        Category::VisionBased,
        Category::NewMaterial,
        Category::Laboratory,
    ];

    /// Display label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BasicEditing => "Basic Editing",
            Category::VisualEnhancement => "Visual Enhancement",
            Category::AiDedup => "AI Dedup/AB-Mix",
            Category::AudioOther => "Audio & Others",
            Category::StrongDedup => "Strong Dedup",
            Category::VisionBased => "Vision-based",
            Category::NewMaterial => "New Material",
            Category::Laboratory => "Laboratory",
        }
    }
}

/// Immutable descriptor for one transformation operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Stable operation id used in job submissions.
    pub id: &'static str,
    /// Display label for shells.
    pub name: &'static str,
    /// Catalog category.
    pub category: Category,
    /// Whether shells should pre-select this operation.
    pub enabled_default: bool,
    /// Declared parameter schema.
    pub params: &'static [ParamSpec],
}

const fn float(name: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Float { min, max, default },
    }
}

const fn int(name: &'static str, min: i64, max: i64, default: i64) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Int { min, max, default },
    }
}

const fn choice(
    name: &'static str,
    options: &'static [&'static str],
    default: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Choice { options, default },
    }
}

const fn op(
    id: &'static str,
    name: &'static str,
    category: Category,
    params: &'static [ParamSpec],
) -> OperationDescriptor {
    OperationDescriptor {
        id,
        name,
        category,
        enabled_default: false,
        params,
    }
}

/// The built-in catalog, grouped by category then declaration order.
pub const OPERATIONS: &[OperationDescriptor] = &[
    // --- Basic Editing ---
    op("md5", "MD5 remux", Category::BasicEditing, &[]),
    op(
        "crop",
        "Micro crop (1-5%)",
        Category::BasicEditing,
        &[
            float("ratio_min", 0.0, 0.5, 0.01),
            float("ratio_max", 0.0, 0.5, 0.05),
        ],
    ),
    op(
        "cut_head_tail",
        "Trim head/tail",
        Category::BasicEditing,
        &[float("cut_seconds", 0.1, 10.0, 1.0)],
    ),
    op(
        "rotate",
        "Micro rotation (±1.5°)",
        Category::BasicEditing,
        &[float("max_degrees", 0.1, 10.0, 1.5)],
    ),
    op(
        "speed",
        "Non-linear speed (0.9-1.1x)",
        Category::BasicEditing,
        &[float("range", 0.01, 0.5, 0.1)],
    ),
    op(
        "mirror",
        "Mirror flip",
        Category::BasicEditing,
        &[choice(
            "direction",
            &["horizontal", "vertical", "both"],
            "horizontal",
        )],
    ),
    op(
        "fps_60",
        "Force 60 fps",
        Category::BasicEditing,
        &[int("target_fps", 24, 120, 60)],
    ),
    op(
        "bitrate_hq",
        "High bitrate (15Mbps)",
        Category::BasicEditing,
        &[choice("bitrate", &["5M", "10M", "15M", "20M"], "15M")],
    ),
    // --- Visual Enhancement ---
    op(
        "sharpen",
        "Smart sharpen",
        Category::VisualEnhancement,
        &[float("strength", 0.0, 5.0, 1.0)],
    ),
    op(
        "portrait",
        "Smart sharpen (portrait)",
        Category::VisualEnhancement,
        &[float("strength", 0.5, 10.0, 2.0)],
    ),
    op(
        "denoise",
        "Smart denoise",
        Category::VisualEnhancement,
        &[float("strength", 0.0, 20.0, 5.0)],
    ),
    op("clean", "Smart denoise (clean)", Category::VisualEnhancement, &[]),
    op(
        "grain",
        "Film grain",
        Category::VisualEnhancement,
        &[float("strength", 0.0, 0.5, 0.1)],
    ),
    op(
        "blur",
        "Soft focus",
        Category::VisualEnhancement,
        &[float("sigma", 0.1, 10.0, 2.0)],
    ),
    op(
        "color",
        "Random color temperature",
        Category::VisualEnhancement,
        &[float("max_shift", 0.01, 0.3, 0.12)],
    ),
    op(
        "vignette",
        "Cinematic vignette",
        Category::VisualEnhancement,
        &[float("strength", 0.1, 1.0, 0.5)],
    ),
    op("bw", "Black & white", Category::VisualEnhancement, &[]),
    op(
        "border",
        "Smart blur border",
        Category::VisualEnhancement,
        &[int("width", 0, 500, 20)],
    ),
    op(
        "pull",
        "Smart frame pull",
        Category::VisualEnhancement,
        &[int("drop_interval", 10, 120, 30)],
    ),
    op(
        "corner",
        "Corner blur",
        Category::VisualEnhancement,
        &[float("radius", 10.0, 200.0, 50.0)],
    ),
    // --- AI Dedup/AB-Mix ---
    op(
        "zoom",
        "AI random zoom",
        Category::AiDedup,
        &[float("range", 0.01, 0.3, 0.1)],
    ),
    op(
        "dissolve",
        "AI moving dissolve",
        Category::AiDedup,
        &[float("strength", 0.1, 1.0, 0.5)],
    ),
    op(
        "scan",
        "AI light scan",
        Category::AiDedup,
        &[float("strength", 0.1, 1.0, 0.5)],
    ),
    op(
        "bounce",
        "Bounce effect",
        Category::AiDedup,
        &[float("amplitude", 5.0, 100.0, 20.0)],
    ),
    op("trifold", "Tri-fold screen", Category::AiDedup, &[]),
    op(
        "lava",
        "Lava AB mode",
        Category::AiDedup,
        &[float("strength", 0.1, 1.0, 0.5)],
    ),
    op(
        "flash",
        "3D white flash",
        Category::AiDedup,
        &[float("strength", 0.1, 1.0, 0.3)],
    ),
    op(
        "progressive",
        "Progressive processing",
        Category::AiDedup,
        &[float("ratio", 0.05, 0.5, 0.1)],
    ),
    op("ab_blend", "AB blend mode", Category::AiDedup, &[]),
    op("ab_glitch", "AB glitch", Category::AiDedup, &[]),
    op("ab_shake", "AB shake", Category::AiDedup, &[]),
    op("ab_chroma", "AB chroma shift", Category::AiDedup, &[]),
    op("ab_replace", "AB video replace", Category::AiDedup, &[]),
    op(
        "ab_advanced_replace",
        "Advanced AB replace",
        Category::AiDedup,
        &[],
    ),
    // --- Audio & Others ---
    op("mute", "Mute video", Category::AudioOther, &[]),
    op(
        "audio_noise",
        "Mix weak white noise",
        Category::AudioOther,
        &[float("strength", 0.001, 0.1, 0.01)],
    ),
    op(
        "pitch",
        "Audio pitch shift",
        Category::AudioOther,
        &[float("semitones", 0.5, 12.0, 2.0)],
    ),
    op("touch", "Timestamp-only touch", Category::AudioOther, &[]),
    // --- Strong Dedup ---
    op(
        "strong_crop",
        "Strong crop (8-12%)",
        Category::StrongDedup,
        &[float("ratio", 0.05, 0.3, 0.1)],
    ),
    op(
        "watermark",
        "Add watermark",
        Category::StrongDedup,
        &[
            choice(
                "position",
                &["top_left", "top_right", "bottom_left", "bottom_right", "center"],
                "top_right",
            ),
            float("opacity", 0.1, 1.0, 0.5),
        ],
    ),
    op(
        "encode",
        "Re-encode parameters",
        Category::StrongDedup,
        &[
            int("crf", 18, 30, 23),
            choice(
                "preset",
                &["ultrafast", "superfast", "veryfast", "faster", "fast", "medium"],
                "medium",
            ),
        ],
    ),
    op("sticker", "Add sticker", Category::StrongDedup, &[]),
    op("mask", "Mask overlay", Category::StrongDedup, &[]),
    op("ab_real_replace", "Real AB replace", Category::StrongDedup, &[]),
    // --- Vision-based ---
    op("face_detection", "Face detection", Category::VisionBased, &[]),
    op("object_tracking", "Object tracking", Category::VisionBased, &[]),
    op("opencv_filter", "OpenCV filter", Category::VisionBased, &[]),
    // --- New Material ---
    op("light_effect", "Light effect overlay", Category::NewMaterial, &[]),
    op("pip", "Picture in picture", Category::NewMaterial, &[]),
    op("edge_effect", "Edge effect", Category::NewMaterial, &[]),
    op("goods_template", "Goods template", Category::NewMaterial, &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_full_operation_set() {
        assert_eq!(OPERATIONS.len(), 51);
    }

    #[test]
    fn declaration_order_is_grouped_by_category() {
        let mut last = None;
        for desc in OPERATIONS {
            if let Some(prev) = last {
                assert!(
                    desc.category >= prev,
                    "operation '{}' breaks category grouping",
                    desc.id
                );
            }
            last = Some(desc.category);
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for desc in OPERATIONS {
            assert!(seen.insert(desc.id), "duplicate operation id '{}'", desc.id);
        }
    }

    #[test]
    fn category_counts_match_shell_grouping() {
        let count = |cat: Category| OPERATIONS.iter().filter(|o| o.category == cat).count();
        assert_eq!(count(Category::BasicEditing), 8);
        assert_eq!(count(Category::VisualEnhancement), 12);
        assert_eq!(count(Category::AiDedup), 14);
        assert_eq!(count(Category::AudioOther), 4);
        assert_eq!(count(Category::StrongDedup), 6);
        assert_eq!(count(Category::VisionBased), 3);
        assert_eq!(count(Category::NewMaterial), 4);
        assert_eq!(count(Category::Laboratory), 0);
    }
}
