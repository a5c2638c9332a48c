//! 解剖学グループ（分類先）
//!
//! カタログの `classification.group` に書ける値の閉じた集合。
//! ルールファイルやFix表に未知のグループ名があれば読み込み時にエラーになる。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Nerves,
    Muscles,
    Ligaments,
    Bones,
    Organs,
    Arteries,
    Veins,
    Brain,
    Eyes,
    Lungs,
    Teeth,
    Cartilage,
    Glands,
    Ear,
    Heart,
    SkinHair,
}

impl Group {
    pub const ALL: [Group; 16] = [
        Group::Nerves,
        Group::Muscles,
        Group::Ligaments,
        Group::Bones,
        Group::Organs,
        Group::Arteries,
        Group::Veins,
        Group::Brain,
        Group::Eyes,
        Group::Lungs,
        Group::Teeth,
        Group::Cartilage,
        Group::Glands,
        Group::Ear,
        Group::Heart,
        Group::SkinHair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Nerves => "nerves",
            Group::Muscles => "muscles",
            Group::Ligaments => "ligaments",
            Group::Bones => "bones",
            Group::Organs => "organs",
            Group::Arteries => "arteries",
            Group::Veins => "veins",
            Group::Brain => "brain",
            Group::Eyes => "eyes",
            Group::Lungs => "lungs",
            Group::Teeth => "teeth",
            Group::Cartilage => "cartilage",
            Group::Glands => "glands",
            Group::Ear => "ear",
            Group::Heart => "heart",
            Group::SkinHair => "skin_hair",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        Group::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == key)
            .ok_or_else(|| Error::UnknownGroup(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_groups() {
        for g in Group::ALL {
            assert_eq!(g.as_str().parse::<Group>().unwrap(), g);
        }
        assert_eq!(" bones ".parse::<Group>().unwrap(), Group::Bones);
    }

    #[test]
    fn test_parse_unknown_group() {
        assert!(matches!("other".parse::<Group>(), Err(Error::UnknownGroup(_))));
        assert!("Bones".parse::<Group>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&Group::SkinHair).unwrap();
        assert_eq!(json, "\"skin_hair\"");
        let back: Group = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Group::SkinHair);
    }
}
