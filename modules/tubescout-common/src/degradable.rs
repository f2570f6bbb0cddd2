/// Outcome of a best-effort step.
///
/// `Degraded` still carries a usable value (a default, or the input left
/// unchanged) together with the reason the step could not do its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradable<T> {
    Ok(T),
    Degraded { value: T, reason: String },
}

impl<T> Degradable<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Degradable::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Degradable::Degraded { .. })
    }

    pub fn into_value(self) -> T {
        match self {
            Degradable::Ok(value) | Degradable::Degraded { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Degradable::Ok(_) => None,
            Degradable::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_keeps_value_and_reason() {
        let d = Degradable::degraded(0u64, "unparsable");
        assert!(d.is_degraded());
        assert_eq!(d.reason(), Some("unparsable"));
        assert_eq!(d.into_value(), 0);
    }

    #[test]
    fn ok_has_no_reason() {
        let d = Degradable::Ok(7u64);
        assert!(!d.is_degraded());
        assert_eq!(d.reason(), None);
        assert_eq!(d.into_value(), 7);
    }
}
