//! Keyword scoring that maps open-vocabulary classifier labels onto garment categories, a thermal
//! index and style tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::garment::GarmentType;

/// Accumulated confidence below which classification falls back to [`GarmentType::Top`].
pub const LOW_CONFIDENCE: f32 = 0.15;

/// Thermal index used when no thermal keyword matched.
pub const NEUTRAL_THERMAL_INDEX: f32 = 0.5;

/// One `(label, confidence)` pair from a general-purpose classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StyleTag {
    Formal,
    Casual,
    Sport,
    Elegant,
}

impl fmt::Display for StyleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StyleTag::Formal => "Formal",
            StyleTag::Casual => "Casual",
            StyleTag::Sport => "Sport",
            StyleTag::Elegant => "Elegant",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GarmentClassification {
    pub kind: GarmentType,
    /// Accumulated confidence of the winning category, clamped to `[0, 1]`.
    pub confidence: f32,
    /// 0 = cold-weather garment, 1 = hot-weather garment.
    pub thermal_index: f32,
    /// Primary tag first.
    pub tags: Vec<StyleTag>,
}

const TYPE_KEYWORDS: &[(GarmentType, &[&str])] = &[
    (
        GarmentType::Top,
        &[
            "shirt", "t-shirt", "tee", "blouse", "top", "tank", "polo", "sweater", "jersey",
            "cardigan", "hoodie", "sweatshirt", "camisole", "tunic", "turtleneck", "pullover",
        ],
    ),
    (
        GarmentType::Bottom,
        &[
            "jeans", "trousers", "pants", "shorts", "skirt", "leggings", "chinos", "joggers",
            "sweatpants", "culottes",
        ],
    ),
    (
        GarmentType::Outerwear,
        &[
            "parka", "coat", "jacket", "trench", "raincoat", "blazer", "anorak", "puffer",
            "windbreaker", "overcoat", "poncho", "vest", "fur coat",
        ],
    ),
    (
        GarmentType::Shoes,
        &[
            "shoe", "sneaker", "boot", "sandal", "loafer", "heel", "trainer", "slipper", "clog",
            "moccasin", "running shoe", "cowboy boot",
        ],
    ),
    (
        GarmentType::Accessory,
        &[
            "hat", "cap", "scarf", "belt", "bag", "handbag", "backpack", "sunglasses", "tie",
            "bow tie", "watch", "glove", "mitten", "necklace", "purse", "wallet",
        ],
    ),
    (
        GarmentType::FullBody,
        &[
            "dress", "gown", "jumpsuit", "overalls", "romper", "kimono", "abaya", "robe", "suit",
            "swimsuit", "bikini", "tracksuit",
        ],
    ),
];

/// `(target thermal index, keywords)` buckets.
const THERMAL_BUCKETS: &[(f32, &[&str])] = &[
    (
        0.0,
        &[
            "parka", "coat", "down", "wool", "sweater", "fleece", "boot", "scarf", "knit",
            "puffer", "hoodie", "cardigan", "thermal", "turtleneck", "mitten", "glove",
            "overcoat", "fur coat", "anorak",
        ],
    ),
    (
        1.0,
        &[
            "tank", "shorts", "sandal", "swimsuit", "bikini", "linen", "sleeveless", "flip-flop",
            "sundress", "camisole", "tee", "t-shirt",
        ],
    ),
    (
        0.5,
        &[
            "shirt", "jeans", "sneaker", "blouse", "polo", "chinos", "trousers", "skirt", "dress",
            "jacket", "blazer", "loafer", "cap", "pants", "trainer",
        ],
    ),
];

const STYLE_KEYWORDS: &[(StyleTag, &[&str])] = &[
    (
        StyleTag::Formal,
        &[
            "suit", "blazer", "tie", "bow tie", "trench", "oxford", "loafer", "dress shirt",
            "tuxedo", "overcoat",
        ],
    ),
    (
        StyleTag::Casual,
        &[
            "tee", "t-shirt", "jeans", "hoodie", "sneaker", "shorts", "sweatshirt", "cardigan",
            "polo", "cap", "sandal",
        ],
    ),
    (
        StyleTag::Sport,
        &[
            "jersey", "joggers", "sweatpants", "running shoe", "trainer", "leggings", "tracksuit",
            "athletic", "windbreaker",
        ],
    ),
    (
        StyleTag::Elegant,
        &[
            "gown", "dress", "silk", "heel", "satin", "lace", "cocktail", "velvet", "kimono",
        ],
    ),
];

/// Lower-cased label with its word list.
struct NormalizedLabel {
    text: String,
    words: Vec<String>,
}

impl NormalizedLabel {
    fn new(label: &str) -> Self {
        let text = label.trim().to_lowercase().replace('_', " ");
        let words = text
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { text, words }
    }

    /// Single-word keywords match whole words (with a plural `s`); phrases match as substrings.
    fn matches(&self, keyword: &str) -> bool {
        if keyword.contains(' ') {
            return self.text.contains(keyword);
        }
        self.words.iter().any(|w| {
            w == keyword
                || w.strip_suffix('s') == Some(keyword)
                || w.strip_suffix("es") == Some(keyword)
        })
    }

    fn matches_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.matches(k))
    }
}

fn usable(labels: &[LabelScore]) -> Vec<(NormalizedLabel, f32)> {
    labels
        .iter()
        .filter(|l| l.confidence.is_finite() && l.confidence > 0.0)
        .map(|l| (NormalizedLabel::new(&l.label), l.confidence.min(1.0)))
        .collect()
}

/// Score classifier output into a garment category, thermal index and style tags.
pub fn classify_labels(labels: &[LabelScore]) -> GarmentClassification {
    let labels = usable(labels);
    let (kind, confidence) = garment_type(&labels);
    GarmentClassification {
        kind,
        confidence,
        thermal_index: thermal_index(&labels),
        tags: style_tags(&labels),
    }
}

fn garment_type(labels: &[(NormalizedLabel, f32)]) -> (GarmentType, f32) {
    let mut best: Option<(GarmentType, f32)> = None;
    for &(kind, keywords) in TYPE_KEYWORDS {
        let score: f32 = labels
            .iter()
            .filter(|(l, _)| l.matches_any(keywords))
            .map(|(_, c)| *c)
            .sum();
        if score > 0.0 && best.is_none_or(|(_, b)| score > b) {
            best = Some((kind, score));
        }
    }
    match best {
        Some((kind, score)) if score >= LOW_CONFIDENCE => (kind, score.min(1.0)),
        Some((_, score)) => (GarmentType::Top, score),
        None => (GarmentType::Top, 0.0),
    }
}

fn thermal_index(labels: &[(NormalizedLabel, f32)]) -> f32 {
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for (label, conf) in labels {
        // First bucket wins so "down jacket" counts as cold, not mild.
        if let Some(&(target, _)) = THERMAL_BUCKETS
            .iter()
            .find(|(_, keywords)| label.matches_any(keywords))
        {
            weighted += target * conf;
            total += conf;
        }
    }
    if total <= 0.0 {
        return NEUTRAL_THERMAL_INDEX;
    }
    (weighted / total).clamp(0.0, 1.0)
}

fn style_tags(labels: &[(NormalizedLabel, f32)]) -> Vec<StyleTag> {
    let mut scores = BTreeMap::<StyleTag, f32>::new();
    for &(tag, keywords) in STYLE_KEYWORDS {
        let s: f32 = labels
            .iter()
            .filter(|(l, _)| l.matches_any(keywords))
            .map(|(_, c)| *c)
            .sum();
        if s > 0.0 {
            scores.insert(tag, s);
        }
    }

    let max = scores.values().copied().fold(0.0f32, f32::max);
    let leaders: Vec<StyleTag> = scores
        .iter()
        .filter(|&(_, &s)| s == max)
        .map(|(&t, _)| t)
        .collect();
    let primary = match leaders.as_slice() {
        [only] => *only,
        _ => StyleTag::Casual,
    };

    let mut rest: Vec<(StyleTag, f32)> = scores
        .into_iter()
        .filter(|&(t, s)| t != primary && s >= max * 0.5)
        .collect();
    rest.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    std::iter::once(primary)
        .chain(rest.into_iter().map(|(t, _)| t))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/vision/classify.rs"]
mod tests;
