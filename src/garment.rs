//! Garment references and outfit selections.
//!
//! A garment is either a stored item carrying real pixels or a synthetic sample that only has a
//! name, a gradient and an icon. Both share the read-only projection on [`GarmentReference`].

use std::sync::Arc;

use anyhow::Context as _;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::foundation::error::VestureResult;

/// Body slot a garment occupies in an outfit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Top,
    Bottom,
    Shoes,
}

impl Slot {
    /// Drawing and iteration order.
    pub const ALL: [Slot; 3] = [Slot::Top, Slot::Bottom, Slot::Shoes];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Top => "top",
            Slot::Bottom => "bottom",
            Slot::Shoes => "shoes",
        }
    }
}

/// Closed set of garment categories produced by classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentType {
    Top,
    Bottom,
    Outerwear,
    Shoes,
    Accessory,
    FullBody,
}

impl GarmentType {
    pub const ALL: [GarmentType; 6] = [
        GarmentType::Top,
        GarmentType::Bottom,
        GarmentType::Outerwear,
        GarmentType::Shoes,
        GarmentType::Accessory,
        GarmentType::FullBody,
    ];

    /// Outfit slot this type is worn in. Accessories are not placed on the body.
    pub fn slot(self) -> Option<Slot> {
        match self {
            GarmentType::Top | GarmentType::Outerwear | GarmentType::FullBody => Some(Slot::Top),
            GarmentType::Bottom => Some(Slot::Bottom),
            GarmentType::Shoes => Some(Slot::Shoes),
            GarmentType::Accessory => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GarmentType::Top => "top",
            GarmentType::Bottom => "bottom",
            GarmentType::Outerwear => "outerwear",
            GarmentType::Shoes => "shoes",
            GarmentType::Accessory => "accessory",
            GarmentType::FullBody => "full_body",
        }
    }
}

/// Stable garment identity, independent of the slot it is worn in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GarmentId(pub String);

impl GarmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Two-stop vertical gradient in straight RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradient {
    pub start: [u8; 3],
    pub end: [u8; 3],
}

/// Record shape exchanged with the local item store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GarmentRecord {
    pub id: String,
    pub name: String,
    pub kind: GarmentType,
    pub thermal_index: f32,
    #[serde(default)]
    pub style_tags: Vec<String>,
    pub image_bytes: Vec<u8>,
    #[serde(default)]
    pub thumbnail_bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub times_worn: u32,
}

/// A garment backed by a real photo.
#[derive(Clone, Debug)]
pub struct StoredGarment {
    pub id: GarmentId,
    pub name: String,
    pub kind: GarmentType,
    pub thermal_index: f32,
    pub style_tags: Vec<String>,
    /// Isolated garment pixels, straight alpha.
    pub image: Arc<RgbaImage>,
}

impl StoredGarment {
    /// Decode a store record, preferring the thumbnail when present.
    pub fn from_record(record: &GarmentRecord) -> VestureResult<Self> {
        let bytes = record
            .thumbnail_bytes
            .as_deref()
            .unwrap_or(&record.image_bytes);
        let image = image::load_from_memory(bytes)
            .with_context(|| format!("decode garment image for '{}'", record.id))?
            .to_rgba8();
        Ok(Self {
            id: GarmentId::new(record.id.clone()),
            name: record.name.clone(),
            kind: record.kind,
            thermal_index: record.thermal_index.clamp(0.0, 1.0),
            style_tags: record.style_tags.clone(),
            image: Arc::new(image),
        })
    }
}

/// A catalogue placeholder without pixels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleGarment {
    pub id: GarmentId,
    pub name: String,
    pub kind: GarmentType,
    pub gradient: Gradient,
    pub icon: String,
    pub thermal_index: f32,
}

#[derive(Clone, Debug)]
pub enum GarmentReference {
    Stored(StoredGarment),
    Sample(SampleGarment),
}

impl GarmentReference {
    pub fn id(&self) -> &GarmentId {
        match self {
            Self::Stored(g) => &g.id,
            Self::Sample(g) => &g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Stored(g) => &g.name,
            Self::Sample(g) => &g.name,
        }
    }

    pub fn kind(&self) -> GarmentType {
        match self {
            Self::Stored(g) => g.kind,
            Self::Sample(g) => g.kind,
        }
    }

    pub fn slot(&self) -> Option<Slot> {
        self.kind().slot()
    }

    pub fn thermal_index(&self) -> f32 {
        match self {
            Self::Stored(g) => g.thermal_index,
            Self::Sample(g) => g.thermal_index,
        }
    }

    /// Real garment pixels, if this reference has any.
    pub fn image(&self) -> Option<&RgbaImage> {
        match self {
            Self::Stored(g) => Some(g.image.as_ref()),
            Self::Sample(_) => None,
        }
    }

    /// Gradient used when drawing without pixels. Stored garments derive it from their mean
    /// opaque color.
    pub fn gradient(&self) -> Gradient {
        match self {
            Self::Sample(g) => g.gradient,
            Self::Stored(g) => {
                let base = mean_opaque_rgb(&g.image).unwrap_or([128, 128, 128]);
                Gradient {
                    start: base.map(|c| c.saturating_add(28)),
                    end: base.map(|c| c.saturating_sub(28)),
                }
            }
        }
    }
}

fn mean_opaque_rgb(img: &RgbaImage) -> Option<[u8; 3]> {
    let mut sum = [0u64; 3];
    let mut n = 0u64;
    for p in img.pixels().filter(|p| p.0[3] >= 128) {
        for c in 0..3 {
            sum[c] += u64::from(p.0[c]);
        }
        n += 1;
    }
    (n > 0).then(|| sum.map(|s| (s / n) as u8))
}

/// At most one garment per slot.
#[derive(Clone, Debug, Default)]
pub struct OutfitSelection {
    pub top: Option<GarmentReference>,
    pub bottom: Option<GarmentReference>,
    pub shoes: Option<GarmentReference>,
}

impl OutfitSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `garment` in its slot, replacing any previous occupant. Garments without a slot
    /// (accessories) are ignored and returned.
    pub fn wear(&mut self, garment: GarmentReference) -> Option<GarmentReference> {
        match garment.slot() {
            Some(slot) => self.set(slot, Some(garment)),
            None => Some(garment),
        }
    }

    pub fn with(mut self, garment: GarmentReference) -> Self {
        self.wear(garment);
        self
    }

    /// Replace the occupant of `slot`, returning the previous one.
    pub fn set(&mut self, slot: Slot, garment: Option<GarmentReference>) -> Option<GarmentReference> {
        let cell = match slot {
            Slot::Top => &mut self.top,
            Slot::Bottom => &mut self.bottom,
            Slot::Shoes => &mut self.shoes,
        };
        std::mem::replace(cell, garment)
    }

    pub fn get(&self, slot: Slot) -> Option<&GarmentReference> {
        match slot {
            Slot::Top => self.top.as_ref(),
            Slot::Bottom => self.bottom.as_ref(),
            Slot::Shoes => self.shoes.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none() && self.shoes.is_none()
    }

    /// Occupied slots in drawing order.
    pub fn occupied(&self) -> impl Iterator<Item = (Slot, &GarmentReference)> {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|g| (slot, g)))
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.occupied().map(|(s, _)| s).collect()
    }

    /// Identity of the selection: equal for the same garments in the same slots.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Xxh3::new();
        for slot in Slot::ALL {
            h.update(slot.as_str().as_bytes());
            match self.get(slot) {
                Some(g) => {
                    h.update(&[1]);
                    h.update(g.id().0.as_bytes());
                }
                None => h.update(&[0]),
            }
        }
        h.digest()
    }
}

#[cfg(test)]
#[path = "../tests/unit/garment.rs"]
mod tests;
