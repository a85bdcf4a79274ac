//! WiFi frequency bands.

use serde::{Deserialize, Serialize};

/// Enumerated WiFi band. Ordering follows frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrequencyBand {
    #[serde(rename = "2.4GHz")]
    Band2_4GHz,
    #[serde(rename = "5GHz")]
    Band5GHz,
    #[serde(rename = "6GHz")]
    Band6GHz,
}

impl FrequencyBand {
    pub const ALL: [FrequencyBand; 3] = [FrequencyBand::Band2_4GHz, FrequencyBand::Band5GHz, FrequencyBand::Band6GHz];

    /// Classifies any raw frequency (MHz). Everything below 3 GHz is treated as 2.4 GHz and
    /// everything from 5925 MHz up as 6 GHz.
    pub fn from_frequency(frequency_mhz: f64) -> Self {
        if frequency_mhz < 3000.0 {
            FrequencyBand::Band2_4GHz
        } else if frequency_mhz < 5925.0 {
            FrequencyBand::Band5GHz
        } else {
            FrequencyBand::Band6GHz
        }
    }

    /// Representative frequency used for every computation in the band (MHz).
    pub fn center_frequency_mhz(&self) -> f64 {
        match self {
            FrequencyBand::Band2_4GHz => 2400.0,
            FrequencyBand::Band5GHz => 5000.0,
            FrequencyBand::Band6GHz => 6000.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FrequencyBand::Band2_4GHz => "2.4GHz",
            FrequencyBand::Band5GHz => "5GHz",
            FrequencyBand::Band6GHz => "6GHz",
        }
    }
}

impl std::fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(FrequencyBand::from_frequency(2412.0), FrequencyBand::Band2_4GHz);
        assert_eq!(FrequencyBand::from_frequency(2999.9), FrequencyBand::Band2_4GHz);
        assert_eq!(FrequencyBand::from_frequency(5180.0), FrequencyBand::Band5GHz);
        assert_eq!(FrequencyBand::from_frequency(5925.0), FrequencyBand::Band6GHz);
        assert_eq!(FrequencyBand::from_frequency(6115.0), FrequencyBand::Band6GHz);
        for band in FrequencyBand::ALL {
            assert_eq!(FrequencyBand::from_frequency(band.center_frequency_mhz()), band);
        }
    }

    #[test]
    fn band_serializes_as_label() {
        let json = serde_json::to_string(&FrequencyBand::Band5GHz).unwrap();
        assert_eq!(json, "\"5GHz\"");
    }
}
