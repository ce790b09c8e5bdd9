//! Serde helpers that keep non-finite floats through JSON.
//!
//! JSON has no NaN; `serde_json` writes non-finite values as `null` and then
//! refuses to read `null` back into an `f64`. These adapters map `null` back
//! to NaN.

/// `#[serde(with = "crate::io::nan::float")]` for a single `f64`.
pub mod float {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// `#[serde(with = "crate::io::nan::vec")]` for a `Vec<f64>`.
pub mod vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.is_finite().then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::float")]
        scalar: f64,
        #[serde(with = "super::vec")]
        values: Vec<f64>,
    }

    #[test]
    fn nan_survives_json() {
        let h = Holder {
            scalar: f64::NAN,
            values: vec![1.5, f64::NAN, -2.0],
        };
        let text = serde_json::to_string(&h).unwrap();
        assert_eq!(text, r#"{"scalar":null,"values":[1.5,null,-2.0]}"#);

        let back: Holder = serde_json::from_str(&text).unwrap();
        assert!(back.scalar.is_nan());
        assert_eq!(back.values[0], 1.5);
        assert!(back.values[1].is_nan());
        assert_eq!(back.values[2], -2.0);
    }
}
