//! Filtering of user search results by profile fields.
//!
//! Text criteria match as case-insensitive substrings with all whitespace
//! removed, so `"bei jing"` matches `"Beijing"`. Gender accepts common
//! synonyms (`male`, `man`, `男`, ...). An age range is checked against the
//! age computed from the birthday, which therefore needs a year.

use crate::error::FilterError;
use crate::models::User;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(19|20)\d{2}").expect("year pattern is valid"));
static SMALL_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}").expect("number pattern is valid"));

/// Criteria a user must satisfy. Unset criteria match everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    gender: Option<String>,
    location: Option<String>,
    birthday: Option<String>,
    age_range: Option<(Option<u32>, Option<u32>)>,
    education: Option<String>,
    company: Option<String>,
}

impl UserFilter {
    /// A filter that matches every user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep users of this gender.
    pub fn gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = non_empty(gender.into());
        self
    }

    /// Keep users whose location contains this text.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = non_empty(location.into());
        self
    }

    /// Keep users whose birthday contains this text, e.g. `1995`.
    pub fn birthday(mut self, birthday: impl Into<String>) -> Self {
        self.birthday = non_empty(birthday.into());
        self
    }

    /// Keep users whose age lies in `min..=max`. Either bound may be open.
    pub fn age_range(mut self, min: Option<u32>, max: Option<u32>) -> Result<Self, FilterError> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(FilterError::InvalidAgeRange { min, max });
            }
        }
        self.age_range = match (min, max) {
            (None, None) => None,
            bounds => Some(bounds),
        };
        Ok(self)
    }

    /// Keep users whose education contains this text.
    pub fn education(mut self, education: impl Into<String>) -> Self {
        self.education = non_empty(education.into());
        self
    }

    /// Keep users whose company contains this text.
    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = non_empty(company.into());
        self
    }

    /// Whether no criterion is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether `user` satisfies every criterion, with ages computed as of today.
    pub fn matches(&self, user: &User) -> bool {
        self.matches_on(user, Local::now().date_naive())
    }

    /// Whether `user` satisfies every criterion, with ages computed as of `today`.
    pub fn matches_on(&self, user: &User, today: NaiveDate) -> bool {
        if let Some(gender) = &self.gender {
            if normalize_gender(&user.gender) != normalize_gender(gender) {
                return false;
            }
        }

        let text_criteria = [
            (self.location.as_deref(), user.location.as_str()),
            (self.education.as_deref(), user.education.as_str()),
            (self.company.as_deref(), user.company.as_str()),
        ];
        if text_criteria
            .iter()
            .any(|&(needle, value)| needle.is_some_and(|needle| !contains(value, needle)))
        {
            return false;
        }

        self.matches_birthday(&user.birthday, today)
    }

    /// Users from `users` that satisfy every criterion, in order.
    pub fn apply(&self, users: Vec<User>) -> Vec<User> {
        let today = Local::now().date_naive();
        users
            .into_iter()
            .filter(|user| self.matches_on(user, today))
            .collect()
    }

    fn matches_birthday(&self, birthday: &str, today: NaiveDate) -> bool {
        if let Some(expected) = &self.birthday {
            if !contains(birthday, expected) {
                return false;
            }
        }

        let Some((min, max)) = self.age_range else {
            return true;
        };
        let (year, month, day) = parse_birthday(birthday);
        let Some(year) = year else {
            return false;
        };

        let age = age_on(year, month, day, today);
        let above_min = min.map_or(true, |min| age >= i64::from(min));
        let below_max = max.map_or(true, |max| age <= i64::from(max));
        above_min && below_max
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn normalize_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn contains(value: &str, needle: &str) -> bool {
    !value.is_empty() && normalize_text(value).contains(&normalize_text(needle))
}

fn normalize_gender(value: &str) -> String {
    let normalized = normalize_text(value);
    match normalized.as_str() {
        "m" | "male" | "man" | "男" => "m".to_string(),
        "f" | "female" | "woman" | "女" => "f".to_string(),
        _ => normalized,
    }
}

/// Year, month and day found in free-form birthday text.
///
/// The year is the first `19xx`/`20xx`; month and day are the next one or
/// two digit numbers and are dropped when out of range.
fn parse_birthday(text: &str) -> (Option<i32>, Option<u32>, Option<u32>) {
    let text = text.trim();
    if text.is_empty() {
        return (None, None, None);
    }

    let (year, rest) = match YEAR.find(text) {
        Some(m) => (m.as_str().parse().ok(), &text[m.end()..]),
        None => (None, text),
    };

    let mut numbers = SMALL_NUMBER
        .find_iter(rest)
        .filter_map(|m| m.as_str().parse::<u32>().ok());
    let month = numbers.next().filter(|m| (1..=12).contains(m));
    let day = numbers.next().filter(|d| (1..=31).contains(d));

    (year, month, day)
}

fn age_on(year: i32, month: Option<u32>, day: Option<u32>, today: NaiveDate) -> i64 {
    let mut age = i64::from(today.year() - year);
    if let (Some(month), Some(day)) = (month, day) {
        if (today.month(), today.day()) < (month, day) {
            age -= 1;
        }
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            ..User::default()
        }
    }

    fn jan_15_2025() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Bei Jing "), "beijing");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_contains() {
        assert!(contains("Beijing", "bei"));
        assert!(contains("北京 海淀", "北京海淀"));
        assert!(!contains("", "bei"));
        assert!(!contains("Shanghai", "bei"));
    }

    #[test]
    fn test_normalize_gender() {
        assert_eq!(normalize_gender("Male"), "m");
        assert_eq!(normalize_gender("女"), "f");
        assert_eq!(normalize_gender("Unknown"), "unknown");
    }

    #[test]
    fn test_parse_birthday() {
        assert_eq!(parse_birthday("1995-02-03"), (Some(1995), Some(2), Some(3)));
        assert_eq!(parse_birthday("02-03"), (None, Some(2), Some(3)));
        assert_eq!(parse_birthday("1995-13-40"), (Some(1995), None, None));
        assert_eq!(parse_birthday("1995年2月3日 水瓶座"), (Some(1995), Some(2), Some(3)));
        assert_eq!(parse_birthday(""), (None, None, None));
    }

    #[test]
    fn test_age_on() {
        assert_eq!(age_on(2000, Some(2), Some(1), jan_15_2025()), 24);
        assert_eq!(age_on(2000, Some(1), Some(15), jan_15_2025()), 25);
        assert_eq!(age_on(2000, None, None, jan_15_2025()), 25);
    }

    #[test]
    fn test_filter_by_gender_and_location() {
        let users = vec![
            User { gender: "m".into(), location: "Beijing".into(), ..user("1") },
            User { gender: "f".into(), location: "Beijing".into(), ..user("2") },
            User { gender: "m".into(), location: "Beijing".into(), ..user("3") },
            User { gender: "m".into(), location: "Shanghai".into(), ..user("4") },
        ];

        let filter = UserFilter::new().gender("male").location("beijing");
        let ids: Vec<String> = filter.apply(users).into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_filter_by_education_and_company() {
        let users = vec![
            User {
                education: "Test University".into(),
                company: "OpenAI".into(),
                ..user("1")
            },
            User {
                education: "Other School".into(),
                company: "Other".into(),
                ..user("2")
            },
        ];

        let filter = UserFilter::new().education("university").company("openai");
        let ids: Vec<String> = filter.apply(users).into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_filter_by_birthday_and_age_range() {
        let today = jan_15_2025();
        let born = User { birthday: "2000-02-01".into(), ..user("1") };

        assert!(UserFilter::new().birthday("2000").matches_on(&born, today));
        assert!(!UserFilter::new().birthday("1999").matches_on(&born, today));

        let exact = UserFilter::new().age_range(Some(24), Some(24)).unwrap();
        assert!(exact.matches_on(&born, today));

        let older = UserFilter::new().age_range(Some(25), Some(30)).unwrap();
        assert!(!older.matches_on(&born, today));

        let open_max = UserFilter::new().age_range(Some(18), None).unwrap();
        assert!(open_max.matches_on(&born, today));
    }

    #[test]
    fn test_age_range_requires_birth_year() {
        let today = jan_15_2025();
        let filter = UserFilter::new().age_range(Some(20), Some(30)).unwrap();

        assert!(!filter.matches_on(&User { birthday: "02-03".into(), ..user("1") }, today));
        assert!(!filter.matches_on(&user("2"), today));
        assert!(!UserFilter::new().birthday("1995").matches_on(&user("3"), today));
    }

    #[test]
    fn test_gender_filter_rejects_unknown_gender() {
        let filter = UserFilter::new().gender("female");
        assert!(!filter.matches(&user("1")));
        assert!(filter.matches(&User { gender: "f".into(), ..user("2") }));
    }

    #[test]
    fn test_invalid_age_range() {
        assert!(matches!(
            UserFilter::new().age_range(Some(10), Some(5)),
            Err(FilterError::InvalidAgeRange { min: 10, max: 5 })
        ));
    }

    #[test]
    fn test_empty_filter_matches_everyone() {
        let filter = UserFilter::new()
            .gender("  ")
            .age_range(None, None)
            .unwrap();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(vec![user("1"), user("2")]).len(), 2);
        assert!(filter.apply(Vec::new()).is_empty());
    }
}
