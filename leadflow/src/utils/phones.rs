//! Phone normalisation and dialing-code country lookup.

use serde::{Deserialize, Serialize};

/// Characters stripped from raw phone values, in order.
const PHONE_NOISE: [&str; 9] = [".0", "+", "*", "\"", " ", ":", "#", "-", "."];

/// Normalises a raw phone value into bare digits.
///
/// Returns `None` when anything other than digits remains.
#[must_use]
pub fn clear_phone(raw: &str) -> Option<String> {
    let mut phone = raw.to_string();
    for noise in PHONE_NOISE {
        phone = phone.replace(noise, "");
    }
    let phone = phone.trim().trim_start_matches('0');
    if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(phone.to_string())
}

/// One international dialing prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialingCode {
    /// Country display name.
    pub country: String,
    /// Digits only, no `+`.
    pub code: String,
}

impl DialingCode {
    /// Creates a dialing code entry, stripping `+`, `-` and whitespace.
    #[must_use]
    pub fn new(country: impl Into<String>, code: &str) -> Self {
        let code: String = code
            .chars()
            .filter(|c| !matches!(c, '+' | '-') && !c.is_whitespace())
            .collect();
        Self {
            country: country.into().trim().to_string(),
            code,
        }
    }
}

/// Dialing codes ordered longest-prefix first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DialingCode>", into = "Vec<DialingCode>")]
pub struct DialingCodes {
    codes: Vec<DialingCode>,
}

impl From<Vec<DialingCode>> for DialingCodes {
    fn from(mut codes: Vec<DialingCode>) -> Self {
        // stable sort keeps file order among equal lengths
        codes.sort_by(|a, b| b.code.len().cmp(&a.code.len()));
        Self { codes }
    }
}

impl From<DialingCodes> for Vec<DialingCode> {
    fn from(value: DialingCodes) -> Self {
        value.codes
    }
}

impl DialingCodes {
    /// Finds the country whose code is the longest prefix of `phone`.
    #[must_use]
    pub fn country_for(&self, phone: &str) -> Option<&str> {
        if phone.is_empty() {
            return None;
        }
        self.codes
            .iter()
            .filter(|entry| !entry.code.is_empty() && phone.starts_with(&entry.code))
            .max_by_key(|entry| entry.code.len())
            .map(|entry| entry.country.as_str())
    }

    /// Number of known codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true if no codes are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Dialing codes for the markets the clinics usually see.
    #[must_use]
    pub fn common() -> Self {
        [
            ("United States", "1"),
            ("Russia", "7"),
            ("Kazakhstan", "77"),
            ("Egypt", "20"),
            ("South Africa", "27"),
            ("Greece", "30"),
            ("Netherlands", "31"),
            ("Belgium", "32"),
            ("France", "33"),
            ("Spain", "34"),
            ("Hungary", "36"),
            ("Italy", "39"),
            ("Romania", "40"),
            ("Switzerland", "41"),
            ("Austria", "43"),
            ("United Kingdom", "44"),
            ("Denmark", "45"),
            ("Sweden", "46"),
            ("Norway", "47"),
            ("Poland", "48"),
            ("Germany", "49"),
            ("Mexico", "52"),
            ("Brazil", "55"),
            ("Australia", "61"),
            ("Turkey", "90"),
            ("India", "91"),
            ("Pakistan", "92"),
            ("Nigeria", "234"),
            ("Kenya", "254"),
            ("Portugal", "351"),
            ("Ireland", "353"),
            ("Cyprus", "357"),
            ("Bulgaria", "359"),
            ("Lithuania", "370"),
            ("Latvia", "371"),
            ("Estonia", "372"),
            ("Moldova", "373"),
            ("Armenia", "374"),
            ("Belarus", "375"),
            ("Ukraine", "380"),
            ("Serbia", "381"),
            ("Montenegro", "382"),
            ("Croatia", "385"),
            ("Slovenia", "386"),
            ("Bosnia and Herzegovina", "387"),
            ("North Macedonia", "389"),
            ("Czech Republic", "420"),
            ("Slovakia", "421"),
            ("United Arab Emirates", "971"),
            ("Israel", "972"),
            ("Georgia", "995"),
            ("Kyrgyzstan", "996"),
            ("Uzbekistan", "998"),
            ("Canada (Ontario)", "1416"),
        ]
        .into_iter()
        .map(|(country, code)| DialingCode::new(country, code))
        .collect::<Vec<_>>()
        .into()
    }
}
