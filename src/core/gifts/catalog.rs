// src/core/gifts/catalog.rs

//! The builtin gift reaction table.

use super::GiftHandler;
use crate::core::metrics;
use std::sync::Arc;
use tracing::info;

/// Display names that get a reaction out of the box, spelled exactly as the
/// provider sends them.
pub const BUILTIN_GIFTS: [&str; 51] = [
    "Bravo",
    "Rose",
    "Health Potion",
    "Tennis",
    "Love Letter",
    "Alien Peace Sign",
    "Football",
    "GG",
    "Hi July",
    "Mini Speaker",
    "Lightning Bolt",
    "Coffee",
    "Ice Cream Cone",
    "Weights",
    "TikTok Logo",
    "Garden Gnome",
    "Squirrel",
    "Daisies",
    "Pink Shoes",
    "Duckling",
    "Chic",
    "Pandas",
    "Finger Heart",
    "Mic",
    "Hi",
    "Cotton\u{2019}s Shell",
    "Dance Together",
    "Goose",
    "LOVE Balloon",
    "Swan",
    "TikTok Trophy",
    "Shoes",
    "Silver Gummy",
    "Pearl",
    "Train",
    "Badminton",
    "Travel With You",
    "Dinosaur",
    "Disco Ball",
    "Email Message",
    "Galaxy",
    "Gerry the Giraffe",
    "Gold Gummy",
    "Gold Mine",
    "Magic Lamp",
    "Mirror Flower",
    "Space",
    "Watermelon Love",
    "Diamond Tree",
    "Fireworks",
    "Diamond",
];

/// The builtin reaction: records that the gift fired.
pub fn reaction(name: &str) -> GiftHandler {
    let name: Arc<str> = Arc::from(name);
    Arc::new(move || {
        info!(gift = %name, "Gift reaction triggered.");
        metrics::GIFT_REACTIONS_TOTAL
            .with_label_values(&[&*name])
            .inc();
        Ok(())
    })
}
