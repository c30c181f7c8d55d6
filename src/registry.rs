//! Per-address display profiles for the panels on one bus

use crate::core::{Address, PanelType};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Geometry and technology of one addressed panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayProfile {
    /// Bus address of the panel
    pub address: Address,
    /// Width in pixels (columns)
    pub width: usize,
    /// Height in pixels (rows)
    pub height: usize,
    /// LED or flip-dot
    pub panel_type: PanelType,
}

impl DisplayProfile {
    /// Create a new profile, rejecting zero dimensions
    pub fn new(address: Address, width: usize, height: usize, panel_type: PanelType) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(DisplayProfile {
            address,
            width,
            height,
            panel_type,
        })
    }

    /// Fail unless `width`x`height` matches this profile
    pub fn check_dimensions(&self, width: usize, height: usize) -> Result<()> {
        if width != self.width || height != self.height {
            return Err(Error::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }
        Ok(())
    }

    /// Fail unless this profile is of the given panel type
    pub fn check_panel_type(&self, expected: PanelType) -> Result<()> {
        if self.panel_type != expected {
            return Err(Error::PanelMismatch {
                address: self.address,
                expected,
                actual: self.panel_type,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for DisplayProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {}x{})",
            self.address, self.panel_type, self.width, self.height
        )
    }
}

/// Display configuration for every address on a bus
///
/// One profile per address. Setting an address that is already present
/// replaces its profile; nothing is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayRegistry {
    profiles: BTreeMap<Address, DisplayProfile>,
}

impl DisplayRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the profile for an address
    pub fn set(
        &mut self,
        address: Address,
        width: usize,
        height: usize,
        panel_type: PanelType,
    ) -> Result<()> {
        let profile = DisplayProfile::new(address, width, height, panel_type)?;
        self.profiles.insert(address, profile);
        Ok(())
    }

    /// Register or replace a ready-made profile
    pub fn insert(&mut self, profile: DisplayProfile) -> Result<()> {
        self.set(profile.address, profile.width, profile.height, profile.panel_type)
    }

    /// Get the profile for an address
    pub fn get(&self, address: Address) -> Result<&DisplayProfile> {
        self.profiles
            .get(&address)
            .ok_or(Error::NotFound { address })
    }

    /// Remove an address, returning its profile if it was registered
    pub fn remove(&mut self, address: Address) -> Option<DisplayProfile> {
        self.profiles.remove(&address)
    }

    /// Number of registered displays
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no display is registered
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = &DisplayProfile> {
        self.profiles.values()
    }

    /// Serialize every profile as a JSON array
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        let profiles: Vec<&DisplayProfile> = self.iter().collect();
        serde_json::to_string_pretty(&profiles).map_err(|e| Error::format(e.to_string()))
    }

    /// Load profiles from a JSON array, later duplicates replacing earlier ones
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: Vec<DisplayProfile> =
            serde_json::from_str(json).map_err(|e| Error::format(e.to_string()))?;
        let mut registry = DisplayRegistry::new();
        for profile in profiles {
            registry.insert(profile)?;
        }
        Ok(registry)
    }
}
