use crate::garment::OutfitSelection;

/// Appended to every positive prompt.
pub const QUALITY_QUALIFIERS: &[&str] = &[
    "photorealistic",
    "natural lighting",
    "realistic fabric texture",
    "high detail",
    "sharp focus",
];

/// Artifacts the generator is steered away from.
pub const NEGATIVE_KEYWORDS: &[&str] = &[
    "deformed",
    "distorted",
    "disfigured",
    "bad anatomy",
    "extra limbs",
    "blurry",
    "low quality",
    "watermark",
    "text",
    "cartoon",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub positive: String,
    pub negative: String,
}

/// Prompt pair for `outfit`, naming garments in slot order. An empty outfit describes the
/// person as they are; the generator never asks for one, but other callers may.
pub fn build_prompt(outfit: &OutfitSelection) -> Prompt {
    let names: Vec<String> = outfit
        .occupied()
        .map(|(_, g)| {
            let name = g.name().trim();
            if name.is_empty() {
                g.kind().as_str().replace('_', " ")
            } else {
                name.to_string()
            }
        })
        .collect();
    let garments = match names.as_slice() {
        [] => "their own clothes".to_string(),
        [one] => one.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    };
    Prompt {
        positive: format!(
            "a full-body photo of a person wearing {garments}, {}",
            QUALITY_QUALIFIERS.join(", ")
        ),
        negative: NEGATIVE_KEYWORDS.join(", "),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/generation/prompt.rs"]
mod tests;
