//! Deployment-license gate consulted by pre-save validation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LicenseError {
    #[error("a professional license is required for this feature")]
    ProfessionalRequired,
}

/// External license service.
pub trait LicenseChecker: Send + Sync {
    fn check_professional_license(&self) -> Result<(), LicenseError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseTier {
    #[default]
    Community,
    Professional,
}

impl FromStr for LicenseTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "community" => Ok(Self::Community),
            "professional" => Ok(Self::Professional),
            other => Err(format!("unknown license tier: {other}")),
        }
    }
}

/// A checker with a fixed, configured tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLicense {
    pub tier: LicenseTier,
}

impl StaticLicense {
    pub fn new(tier: LicenseTier) -> Self {
        Self { tier }
    }
}

impl LicenseChecker for StaticLicense {
    fn check_professional_license(&self) -> Result<(), LicenseError> {
        match self.tier {
            LicenseTier::Professional => Ok(()),
            LicenseTier::Community => Err(LicenseError::ProfessionalRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_professional_tier_passes() {
        assert!(StaticLicense::new(LicenseTier::Professional)
            .check_professional_license()
            .is_ok());
        assert_eq!(
            StaticLicense::default().check_professional_license(),
            Err(LicenseError::ProfessionalRequired)
        );
    }

    #[test]
    fn tier_parses_from_cli_strings() {
        assert_eq!("professional".parse::<LicenseTier>(), Ok(LicenseTier::Professional));
        assert!("enterprise".parse::<LicenseTier>().is_err());
    }
}
