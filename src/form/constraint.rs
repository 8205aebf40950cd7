use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::control::{Control, ControlKind};

/// Native constraint kinds, declared in reporting priority order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ConstraintKind {
    ValueMissing,
    TypeMismatch,
    PatternMismatch,
    TooLong,
    TooShort,
    RangeUnderflow,
    RangeOverflow,
    StepMismatch,
    BadInput,
    CustomError,
}

impl ConstraintKind {
    pub const PRIORITY: [ConstraintKind; 10] = [
        ConstraintKind::ValueMissing,
        ConstraintKind::TypeMismatch,
        ConstraintKind::PatternMismatch,
        ConstraintKind::TooLong,
        ConstraintKind::TooShort,
        ConstraintKind::RangeUnderflow,
        ConstraintKind::RangeOverflow,
        ConstraintKind::StepMismatch,
        ConstraintKind::BadInput,
        ConstraintKind::CustomError,
    ];

    /// Lowercase name used to key override messages.
    pub const fn key(self) -> &'static str {
        match self {
            ConstraintKind::ValueMissing => "valuemissing",
            ConstraintKind::TypeMismatch => "typemismatch",
            ConstraintKind::PatternMismatch => "patternmismatch",
            ConstraintKind::TooLong => "toolong",
            ConstraintKind::TooShort => "tooshort",
            ConstraintKind::RangeUnderflow => "rangeunderflow",
            ConstraintKind::RangeOverflow => "rangeoverflow",
            ConstraintKind::StepMismatch => "stepmismatch",
            ConstraintKind::BadInput => "badinput",
            ConstraintKind::CustomError => "customerror",
        }
    }

    /// Accepts `valueMissing`, `value-missing` and `valuemissing`.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key
            .chars()
            .filter(|ch| *ch != '-' && *ch != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::PRIORITY
            .into_iter()
            .find(|kind| kind.key() == normalized)
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of failing constraints for one control.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Validity {
    flags: u16,
}

impl Validity {
    pub const fn valid() -> Self {
        Self { flags: 0 }
    }

    pub fn with(mut self, kind: ConstraintKind) -> Self {
        self.set(kind, true);
        self
    }

    pub fn set(&mut self, kind: ConstraintKind, failing: bool) {
        if failing {
            self.flags |= kind.bit();
        } else {
            self.flags &= !kind.bit();
        }
    }

    pub const fn has(self, kind: ConstraintKind) -> bool {
        self.flags & kind.bit() != 0
    }

    pub const fn is_valid(self) -> bool {
        self.flags == 0
    }

    /// The single constraint reported when several fail at once.
    pub fn first_failure(self) -> Option<ConstraintKind> {
        ConstraintKind::PRIORITY
            .into_iter()
            .find(|kind| self.has(*kind))
    }

    pub fn failures(self) -> impl Iterator<Item = ConstraintKind> {
        ConstraintKind::PRIORITY
            .into_iter()
            .filter(move |kind| self.has(*kind))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Step {
    #[default]
    Default,
    Any,
    Value(Decimal),
}

/// Declared constraint attributes of a control.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Constraints {
    pub required: bool,
    pub pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub step: Step,
    pub multiple: bool,
    pub custom_error: Option<String>,
}

/// Computes validity from declared constraints, the way a browser would.
///
/// `group` holds every control sharing the name, used for radio groups.
pub fn evaluate(control: &Control, group: &[&Control]) -> Validity {
    let mut validity = Validity::valid();
    let kind = control.kind();
    if control.is_disabled() || !kind.participates() {
        return validity;
    }

    let constraints = control.constraints();
    let value = control.raw_value();

    if constraints.required {
        let missing = match kind {
            ControlKind::Checkbox => !control.is_checked(),
            ControlKind::Radio => !group
                .iter()
                .any(|candidate| candidate.kind() == ControlKind::Radio && candidate.is_checked()),
            ControlKind::File => control.files().is_empty(),
            ControlKind::SelectMultiple => control.selected_values().is_empty(),
            _ => value.is_empty(),
        };
        validity.set(ConstraintKind::ValueMissing, missing);
    }

    if !value.is_empty() && kind.is_text_entry() {
        match kind {
            ControlKind::Email => {
                validity.set(
                    ConstraintKind::TypeMismatch,
                    !email_list_matches(value, constraints.multiple, is_simple_email),
                );
            }
            ControlKind::Url => validity.set(ConstraintKind::TypeMismatch, !is_url_like(value)),
            _ => {}
        }

        let length = value.chars().count();
        if constraints.max_length.is_some_and(|max| length > max) {
            validity.set(ConstraintKind::TooLong, true);
        }
        if constraints.min_length.is_some_and(|min| length < min) {
            validity.set(ConstraintKind::TooShort, true);
        }

        if kind != ControlKind::TextArea
            && let Some(pattern) = constraints.pattern.as_deref().filter(|p| !p.is_empty())
        {
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => {
                    let matches = if kind == ControlKind::Email && constraints.multiple {
                        email_list_matches(value, true, |part| regex.is_match(part))
                    } else {
                        regex.is_match(value)
                    };
                    validity.set(ConstraintKind::PatternMismatch, !matches);
                }
                Err(error) => {
                    debug!(field = %control.name(), %error, "ignoring invalid pattern constraint");
                }
            }
        }
    }

    if !value.is_empty() && matches!(kind, ControlKind::Number | ControlKind::Range) {
        match parse_number(value) {
            Some(number) => {
                if constraints.min.is_some_and(|min| number < min) {
                    validity.set(ConstraintKind::RangeUnderflow, true);
                }
                if constraints.max.is_some_and(|max| number > max) {
                    validity.set(ConstraintKind::RangeOverflow, true);
                }
                let step = match constraints.step {
                    Step::Any => None,
                    Step::Default => Some(Decimal::ONE),
                    Step::Value(step) if step > Decimal::ZERO => Some(step),
                    Step::Value(_) => Some(Decimal::ONE),
                };
                if let Some(step) = step {
                    let base = constraints.min.unwrap_or(Decimal::ZERO);
                    match number
                        .checked_sub(base)
                        .and_then(|offset| offset.checked_rem(step))
                    {
                        Some(remainder) => {
                            validity.set(ConstraintKind::StepMismatch, !remainder.is_zero());
                        }
                        None => {
                            debug!(field = %control.name(), "step offset out of range; skipping step check");
                        }
                    }
                }
            }
            None => validity.set(ConstraintKind::BadInput, true),
        }
    }

    validity.set(
        ConstraintKind::CustomError,
        constraints
            .custom_error
            .as_deref()
            .is_some_and(|message| !message.is_empty()),
    );
    validity
}

pub(crate) fn parse_number(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

fn email_list_matches(value: &str, multiple: bool, check: impl Fn(&str) -> bool) -> bool {
    if !multiple {
        return check(value);
    }
    let mut has_part = false;
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        has_part = true;
        if !check(part) {
            return false;
        }
    }
    has_part
}

fn is_simple_email(value: &str) -> bool {
    let trimmed = value.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !trimmed.chars().any(char::is_whitespace)
}

fn is_url_like(value: &str) -> bool {
    let Some((scheme, rest)) = value.trim().split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
        && !rest.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(control: &Control) -> Validity {
        evaluate(control, &[control])
    }

    #[test]
    fn priority_order_is_fixed() {
        let validity = Validity::valid()
            .with(ConstraintKind::CustomError)
            .with(ConstraintKind::StepMismatch)
            .with(ConstraintKind::TooShort)
            .with(ConstraintKind::PatternMismatch);
        assert_eq!(validity.first_failure(), Some(ConstraintKind::PatternMismatch));
        assert_eq!(
            validity.failures().collect::<Vec<_>>(),
            vec![
                ConstraintKind::PatternMismatch,
                ConstraintKind::TooShort,
                ConstraintKind::StepMismatch,
                ConstraintKind::CustomError,
            ]
        );

        let missing = validity.with(ConstraintKind::ValueMissing);
        assert_eq!(missing.first_failure(), Some(ConstraintKind::ValueMissing));
    }

    #[test]
    fn constraint_keys_parse_from_common_spellings() {
        assert_eq!(
            ConstraintKind::from_key("valueMissing"),
            Some(ConstraintKind::ValueMissing)
        );
        assert_eq!(
            ConstraintKind::from_key("range-underflow"),
            Some(ConstraintKind::RangeUnderflow)
        );
        assert_eq!(ConstraintKind::from_key("nope"), None);
    }

    #[test]
    fn required_text_and_checkbox() {
        let empty = Control::text("name").required(true);
        assert!(eval(&empty).has(ConstraintKind::ValueMissing));
        assert!(eval(&empty.clone().value("Ada")).is_valid());

        let unchecked = Control::checkbox("terms", "yes").required(true);
        assert!(eval(&unchecked).has(ConstraintKind::ValueMissing));
        assert!(eval(&unchecked.checked(true)).is_valid());
    }

    #[test]
    fn required_radio_considers_the_whole_group() {
        let first = Control::radio("plan", "basic").required(true);
        let second = Control::radio("plan", "pro").checked(true);
        assert!(evaluate(&first, &[&first, &second]).is_valid());
        assert!(evaluate(&first, &[&first]).has(ConstraintKind::ValueMissing));
    }

    #[test]
    fn disabled_controls_are_always_valid() {
        let control = Control::text("name").required(true).disabled(true);
        assert!(eval(&control).is_valid());
    }

    #[test]
    fn email_type_and_pattern() {
        let email = Control::new("email", ControlKind::Email).value("not-an-email");
        assert_eq!(
            eval(&email).first_failure(),
            Some(ConstraintKind::TypeMismatch)
        );

        let patterned = Control::new("email", ControlKind::Email)
            .pattern(".+@example\\.com")
            .value("ada@other.org");
        assert_eq!(
            eval(&patterned).first_failure(),
            Some(ConstraintKind::PatternMismatch)
        );

        let multiple = Control::new("cc", ControlKind::Email)
            .multiple(true)
            .value("a@x.io, b@y.io");
        assert!(eval(&multiple).is_valid());
    }

    #[test]
    fn pattern_is_anchored() {
        let control = Control::text("code").pattern("[0-9]{3}").value("1234");
        assert!(eval(&control).has(ConstraintKind::PatternMismatch));
        assert!(eval(&control.value("123")).is_valid());
    }

    #[test]
    fn length_counts_chars() {
        let control = Control::text("nick").min_length(3).max_length(4);
        assert!(eval(&control.clone().value("éé")).has(ConstraintKind::TooShort));
        assert!(eval(&control.clone().value("éééé")).is_valid());
        assert!(eval(&control.value("ééééé")).has(ConstraintKind::TooLong));
    }

    #[test]
    fn numeric_range_step_and_bad_input() {
        let amount = Control::new("amount", ControlKind::Number)
            .min(Decimal::ZERO)
            .max(Decimal::new(10, 0))
            .step(Step::Value(Decimal::new(1, 1)));

        assert!(eval(&amount.clone().value("0.3")).is_valid());
        assert!(eval(&amount.clone().value("0.35")).has(ConstraintKind::StepMismatch));
        assert!(eval(&amount.clone().value("-1")).has(ConstraintKind::RangeUnderflow));
        assert!(eval(&amount.clone().value("11")).has(ConstraintKind::RangeOverflow));
        assert!(eval(&amount.value("abc")).has(ConstraintKind::BadInput));

        let any = Control::new("ratio", ControlKind::Number)
            .step(Step::Any)
            .value("0.123");
        assert!(eval(&any).is_valid());
    }

    #[test]
    fn step_check_survives_values_at_the_decimal_limit() {
        let amount = Control::new("amount", ControlKind::Number)
            .min(Decimal::NEGATIVE_ONE)
            .value("79228162514264337593543950335");
        let validity = eval(&amount);
        assert!(!validity.has(ConstraintKind::StepMismatch));
        assert!(!validity.has(ConstraintKind::BadInput));
        assert!(validity.is_valid());
    }

    #[test]
    fn custom_error_flag_follows_message() {
        let control = Control::text("name").value("x").custom_error("taken");
        assert_eq!(
            eval(&control).first_failure(),
            Some(ConstraintKind::CustomError)
        );
    }
}
