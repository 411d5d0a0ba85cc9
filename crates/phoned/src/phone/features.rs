use std::fmt;
use std::ops::BitOr;

use serde::Serialize;
use serde::Serializer;
use strum::Display;
use strum::EnumIter;
use strum::IntoEnumIterator;

/// A capability a phone device may support.
///
/// The discriminants are the bit values used on the wire by other phone
/// integrations, so a feature set round-trips through a plain integer mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PhoneFeature {
    Call = 1,
    DialEvent = 2,
    Voicemail = 4,
    CallEnd = 8,
    CallFail = 16,
    Sms = 32,
}

impl PhoneFeature {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// Set of supported phone features.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SupportedFeatures(u32);

impl SupportedFeatures {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, feature: PhoneFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn insert(&mut self, feature: PhoneFeature) {
        self.0 |= feature.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = PhoneFeature> {
        PhoneFeature::iter().filter(move |f| self.contains(*f))
    }
}

impl From<PhoneFeature> for SupportedFeatures {
    fn from(feature: PhoneFeature) -> Self {
        Self(feature.bit())
    }
}

impl FromIterator<PhoneFeature> for SupportedFeatures {
    fn from_iter<T: IntoIterator<Item = PhoneFeature>>(iter: T) -> Self {
        let mut set = Self::empty();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl BitOr for PhoneFeature {
    type Output = SupportedFeatures;

    fn bitor(self, rhs: Self) -> SupportedFeatures {
        SupportedFeatures(self.bit() | rhs.bit())
    }
}

impl BitOr<PhoneFeature> for SupportedFeatures {
    type Output = SupportedFeatures;

    fn bitor(self, rhs: PhoneFeature) -> SupportedFeatures {
        SupportedFeatures(self.0 | rhs.bit())
    }
}

impl fmt::Debug for SupportedFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Serialized as the list of feature names, e.g. `["call", "call_end"]`.
impl Serialize for SupportedFeatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
