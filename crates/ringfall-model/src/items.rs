//! Items handed out during a match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

macro_rules! item_kinds {
    ($($variant:ident => $id:literal),+ $(,)?) => {
        /// The item types the match core can grant.
        ///
        /// Identifiers are snake_case (`"golden_apple"`); configuration
        /// tables refer to items by these identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ItemKind {
            $($variant),+
        }

        impl ItemKind {
            /// Every known item kind.
            pub const ALL: &'static [ItemKind] = &[$(ItemKind::$variant),+];

            /// The snake_case identifier of this item.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ItemKind::$variant => $id),+
                }
            }
        }

        impl FromStr for ItemKind {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_lowercase();
                let normalized = normalized.strip_prefix("minecraft:").unwrap_or(&normalized);
                match normalized {
                    $($id => Ok(ItemKind::$variant),)+
                    _ => Err(ModelError::UnknownItem(s.to_string())),
                }
            }
        }
    };
}

item_kinds! {
    IronSword => "iron_sword",
    StoneSword => "stone_sword",
    DiamondSword => "diamond_sword",
    IronAxe => "iron_axe",
    DiamondAxe => "diamond_axe",
    Bow => "bow",
    Crossbow => "crossbow",
    Arrow => "arrow",
    SpectralArrow => "spectral_arrow",
    Shield => "shield",
    GoldenApple => "golden_apple",
    EnchantedGoldenApple => "enchanted_golden_apple",
    GoldenCarrot => "golden_carrot",
    CookedBeef => "cooked_beef",
    EnderPearl => "ender_pearl",
    TotemOfUndying => "totem_of_undying",
    EndCrystal => "end_crystal",
    NetheriteIngot => "netherite_ingot",
    Cobblestone => "cobblestone",
    Snowball => "snowball",
    Egg => "egg",
    FishingRod => "fishing_rod",
    Tnt => "tnt",
    FireCharge => "fire_charge",
    WaterBucket => "water_bucket",
    IronChestplate => "iron_chestplate",
    IronHelmet => "iron_helmet",
    DiamondHelmet => "diamond_helmet",
    DiamondChestplate => "diamond_chestplate",
    DiamondLeggings => "diamond_leggings",
    DiamondBoots => "diamond_boots",
    Potion => "potion",
    SplashPotion => "splash_potion",
    LingeringPotion => "lingering_potion",
}

impl ItemKind {
    /// Potions carry a secondary effect chosen when the item is created.
    pub fn is_potion(self) -> bool {
        matches!(self, Self::Potion | Self::SplashPotion | Self::LingeringPotion)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PotionKind
// ---------------------------------------------------------------------------

/// Potion contents that may be attached to a potion item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotionKind {
    StrongHealing,
    Regeneration,
    StrongStrength,
    StrongSwiftness,
    FireResistance,
    Invisibility,
    NightVision,
    StrongLeaping,
    WaterBreathing,
    StrongSlowness,
    StrongHarming,
    Poison,
    Weakness,
    StrongTurtleMaster,
}

impl PotionKind {
    /// The curated set drawn from when a potion item is granted.
    pub const ALLOWED: [PotionKind; 14] = [
        PotionKind::StrongHealing,
        PotionKind::Regeneration,
        PotionKind::StrongStrength,
        PotionKind::StrongSwiftness,
        PotionKind::FireResistance,
        PotionKind::Invisibility,
        PotionKind::NightVision,
        PotionKind::StrongLeaping,
        PotionKind::WaterBreathing,
        PotionKind::StrongSlowness,
        PotionKind::StrongHarming,
        PotionKind::Poison,
        PotionKind::Weakness,
        PotionKind::StrongTurtleMaster,
    ];
}

// ---------------------------------------------------------------------------
// ItemStack
// ---------------------------------------------------------------------------

/// A quantity of one item, optionally with potion contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub kind: ItemKind,
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potion: Option<PotionKind>,
}

impl ItemStack {
    pub fn new(kind: ItemKind, amount: u32) -> Self {
        Self {
            kind,
            amount,
            potion: None,
        }
    }

    pub fn one(kind: ItemKind) -> Self {
        Self::new(kind, 1)
    }

    pub fn with_potion(mut self, potion: PotionKind) -> Self {
        self.potion = Some(potion);
        self
    }
}
