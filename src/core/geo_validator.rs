use crate::config::toml_config::ValidatorConfig;
use crate::domain::model::{Coordinate, Rejection};

/// Bounding box and confidence gate applied to every coordinate before it is
/// stored or turned into a target.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoValidator {
    min_latitude: f64,
    max_latitude: f64,
    min_longitude: f64,
    max_longitude: f64,
    confidence_floor: f64,
    confidence_ceiling: f64,
}

impl GeoValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            min_latitude: config.min_latitude,
            max_latitude: config.max_latitude,
            min_longitude: config.min_longitude,
            max_longitude: config.max_longitude,
            confidence_floor: config.confidence_floor,
            confidence_ceiling: config.confidence_ceiling,
        }
    }

    pub fn validate(&self, coordinate: &Coordinate) -> Result<(), Rejection> {
        let Coordinate {
            latitude,
            longitude,
            confidence,
        } = *coordinate;

        if !(latitude.is_finite() && longitude.is_finite() && confidence.is_finite()) {
            return Err(Rejection::MalformedValue(format!(
                "non-finite component in ({}, {}, {})",
                latitude, longitude, confidence
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Rejection::MalformedValue(format!(
                "confidence {} is outside [0, 1]",
                confidence
            )));
        }

        if !(self.min_latitude..=self.max_latitude).contains(&latitude)
            || !(self.min_longitude..=self.max_longitude).contains(&longitude)
        {
            return Err(Rejection::OutOfBounds {
                latitude,
                longitude,
            });
        }

        if confidence < self.confidence_floor {
            return Err(Rejection::LowConfidence {
                confidence,
                floor: self.confidence_floor,
            });
        }
        if confidence > self.confidence_ceiling {
            return Err(Rejection::MalformedValue(format!(
                "confidence {} is above the plausible ceiling {}",
                confidence, self.confidence_ceiling
            )));
        }

        Ok(())
    }
}

impl Default for GeoValidator {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_coordinates_inside_the_box() {
        let validator = GeoValidator::default();
        assert!(validator.validate(&Coordinate::new(49.99, 36.23, 0.95)).is_ok());
        assert!(validator.validate(&Coordinate::new(44.0, 22.0, 0.8)).is_ok());
        assert!(validator.validate(&Coordinate::new(52.5, 40.5, 0.99)).is_ok());
    }

    #[test]
    fn test_rejects_out_of_bounds() {
        let validator = GeoValidator::default();
        for (lat, lon) in [(43.99, 30.0), (52.51, 30.0), (48.0, 21.99), (48.0, 40.51), (55.75, 37.61)] {
            assert!(matches!(
                validator.validate(&Coordinate::new(lat, lon, 0.9)),
                Err(Rejection::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_low_and_implausible_confidence() {
        let validator = GeoValidator::default();
        assert!(matches!(
            validator.validate(&Coordinate::new(49.0, 30.0, 0.79)),
            Err(Rejection::LowConfidence { .. })
        ));
        assert!(matches!(
            validator.validate(&Coordinate::new(49.0, 30.0, 1.0)),
            Err(Rejection::MalformedValue(_))
        ));
        assert!(matches!(
            validator.validate(&Coordinate::new(49.0, 30.0, -0.1)),
            Err(Rejection::MalformedValue(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let validator = GeoValidator::default();
        assert!(matches!(
            validator.validate(&Coordinate::new(f64::NAN, 30.0, 0.9)),
            Err(Rejection::MalformedValue(_))
        ));
        assert!(matches!(
            validator.validate(&Coordinate::new(49.0, f64::INFINITY, 0.9)),
            Err(Rejection::MalformedValue(_))
        ));
    }

    #[test]
    fn test_custom_floor_is_honoured() {
        let config = ValidatorConfig {
            confidence_floor: 0.5,
            ..ValidatorConfig::default()
        };
        let validator = GeoValidator::new(&config);
        assert!(validator.validate(&Coordinate::new(49.0, 30.0, 0.6)).is_ok());
    }
}
