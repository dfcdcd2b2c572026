//! Input validation for poll creation and editing.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{
    CreatePollRequest, NewPoll, Poll, PollStatus, PollType, QuickPollRequest, UpdatePollRequest,
    User,
};

pub const TITLE_MIN: usize = 5;
pub const TEXT_MAX: usize = 200;
pub const FREE_MAX_CHOICES: usize = 5;
pub const PREMIUM_MAX_CHOICES: usize = 10;
pub const FREE_MAX_POLLS: i64 = 1;
pub const PREMIUM_MAX_POLLS: i64 = 50;
pub const FREE_MAX_EXPIRY_DAYS: i64 = 30;
pub const MAX_EXPIRY_DAYS: i64 = 365;
pub const QUICK_EXPIRY_HOURS: [i64; 4] = [1, 6, 24, 168];

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Most polls `user` may own; enforced by the store when the poll is saved.
pub fn poll_limit(user: &User, now: DateTime<Utc>) -> i64 {
    if user.is_premium_active(now) {
        PREMIUM_MAX_POLLS
    } else {
        FREE_MAX_POLLS
    }
}

pub fn quota_error(user: &User, now: DateTime<Utc>) -> AppError {
    let hint = if user.is_premium_active(now) {
        "Delete some polls to create new ones."
    } else {
        "Upgrade to premium for more polls."
    };
    invalid(format!(
        "You have reached your poll limit ({} polls). {hint}",
        poll_limit(user, now)
    ))
}

pub fn clean_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if char_len(title) < TITLE_MIN {
        return Err(invalid("Poll title must be at least 5 characters long."));
    }
    if char_len(title) > TEXT_MAX {
        return Err(invalid("Poll title is too long (max 200 characters)."));
    }
    Ok(title.to_string())
}

/// Splits the textarea into trimmed, non-blank choices.
pub fn clean_choices(raw: &str, premium: bool) -> Result<Vec<String>, AppError> {
    let choices: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if choices.len() < 2 {
        return Err(invalid("You must provide at least 2 choices."));
    }

    let max_choices = if premium { PREMIUM_MAX_CHOICES } else { FREE_MAX_CHOICES };
    if choices.len() > max_choices {
        let hint = if premium { "" } else { " Upgrade to premium for up to 10 choices." };
        return Err(invalid(format!("Maximum {max_choices} choices allowed.{hint}")));
    }

    for (i, choice) in choices.iter().enumerate() {
        if char_len(choice) > TEXT_MAX {
            return Err(invalid(format!(
                "Choice {} is too long (max 200 characters).",
                i + 1
            )));
        }
    }

    let distinct: HashSet<&String> = choices.iter().collect();
    if distinct.len() != choices.len() {
        return Err(invalid("Duplicate choices are not allowed."));
    }

    Ok(choices)
}

pub fn build_poll(
    req: CreatePollRequest,
    user: &User,
    slug: String,
    now: DateTime<Utc>,
) -> Result<NewPoll, AppError> {
    let premium = user.is_premium_active(now);

    let title = clean_title(&req.title)?;
    let choices = clean_choices(&req.choices, premium)?;

    if !premium && !matches!(req.poll_type, PollType::Single | PollType::YesNo) {
        return Err(invalid("This poll type requires a premium account."));
    }
    if !premium && req.require_login {
        return Err(invalid("Requiring login is a premium feature."));
    }

    let expires_at = match req.expires_in_days {
        None => None,
        Some(days) if !(1..=MAX_EXPIRY_DAYS).contains(&days) => {
            return Err(invalid("Expiry must be between 1 and 365 days."));
        }
        Some(days) if days > FREE_MAX_EXPIRY_DAYS && !premium => {
            return Err(invalid(
                "Free users can set expiry up to 30 days. Upgrade for longer polls.",
            ));
        }
        Some(days) => Some(now + Duration::days(days)),
    };

    if req.poll_type == PollType::YesNo && req.allow_multiple_votes {
        return Err(invalid("Yes/No polls cannot allow multiple votes."));
    }

    Ok(NewPoll {
        slug,
        title,
        description: req.description.trim().to_string(),
        creator_id: user.id,
        poll_type: req.poll_type,
        status: PollStatus::Active,
        is_active: true,
        allow_multiple_votes: req.allow_multiple_votes,
        require_login: req.require_login,
        show_results: req.show_results,
        allow_anonymous: req.allow_anonymous,
        expires_at,
        choices,
    })
}

pub fn build_quick_poll(
    req: QuickPollRequest,
    user: &User,
    slug: String,
    now: DateTime<Utc>,
) -> Result<NewPoll, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(invalid("Your question cannot be empty."));
    }
    if char_len(question) > TEXT_MAX {
        return Err(invalid("Your question is too long (max 200 characters)."));
    }

    let choices = match req.poll_type {
        PollType::YesNo => vec!["Yes".to_string(), "No".to_string()],
        PollType::Single => {
            let options: Vec<String> = [req.option_1, req.option_2, req.option_3]
                .into_iter()
                .map(|option| option.unwrap_or_default().trim().to_string())
                .collect();
            if options[0].is_empty() || options[1].is_empty() {
                return Err(invalid("Multiple choice polls need at least 2 options."));
            }
            if options.iter().any(|option| char_len(option) > TEXT_MAX) {
                return Err(invalid("Options are limited to 200 characters."));
            }
            options.into_iter().filter(|option| !option.is_empty()).collect()
        }
        _ => return Err(invalid("Quick polls are either yes/no or single choice.")),
    };

    let expires_at = match req.expires_in_hours {
        None => None,
        Some(hours) if QUICK_EXPIRY_HOURS.contains(&hours) => Some(now + Duration::hours(hours)),
        Some(_) => return Err(invalid("Expiry must be 1, 6, 24 or 168 hours.")),
    };

    Ok(NewPoll {
        slug,
        title: question.to_string(),
        description: String::new(),
        creator_id: user.id,
        poll_type: req.poll_type,
        status: PollStatus::Active,
        is_active: true,
        allow_multiple_votes: false,
        require_login: false,
        show_results: true,
        allow_anonymous: true,
        expires_at,
        choices,
    })
}

/// Applies an edit to `poll` in place, then the expiry rule.
pub fn apply_edit(poll: &mut Poll, edit: UpdatePollRequest, now: DateTime<Utc>) -> Result<(), AppError> {
    if let Some(title) = edit.title {
        let title = clean_title(&title)?;
        if poll.total_votes > 0 && title != poll.title {
            return Err(invalid("Cannot change title after voting has started."));
        }
        poll.title = title;
    }
    if let Some(description) = edit.description {
        poll.description = description.trim().to_string();
    }
    if let Some(is_active) = edit.is_active {
        poll.is_active = is_active;
    }
    if let Some(show_results) = edit.show_results {
        poll.show_results = show_results;
    }
    if let Some(expires_at) = edit.expires_at {
        poll.expires_at = expires_at;
    }
    poll.apply_expiry(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::fixtures;

    fn request(choices: &str) -> CreatePollRequest {
        CreatePollRequest {
            title: "  Where should we eat?  ".to_string(),
            description: String::new(),
            poll_type: PollType::Single,
            choices: choices.to_string(),
            expires_in_days: None,
            allow_multiple_votes: false,
            require_login: false,
            show_results: true,
            allow_anonymous: true,
        }
    }

    #[test]
    fn test_build_poll_trims_and_activates() {
        let now = Utc::now();
        let user = fixtures::user(now, false);
        let mut req = request("Pizza\n\n  Sushi \nTacos\n");
        req.expires_in_days = Some(7);

        let poll = build_poll(req, &user, "slug0001".to_string(), now).unwrap();
        assert_eq!(poll.title, "Where should we eat?");
        assert_eq!(poll.choices, vec!["Pizza", "Sushi", "Tacos"]);
        assert_eq!(poll.status, PollStatus::Active);
        assert_eq!(poll.expires_at, Some(now + Duration::days(7)));
    }

    #[test]
    fn test_choice_limits_depend_on_plan() {
        assert!(clean_choices("only one", false).is_err());
        assert!(clean_choices("a\nb\nc\nd\ne\nf", false).is_err());
        assert_eq!(clean_choices("a\nb\nc\nd\ne\nf", true).unwrap().len(), 6);
        assert!(clean_choices("a\nb\na", true).is_err());
        assert!(clean_choices(&format!("a\n{}", "x".repeat(201)), true).is_err());
    }

    #[test]
    fn test_short_title_rejected() {
        assert!(clean_title("  Hey ").is_err());
        assert_eq!(clean_title(" Hello ").unwrap(), "Hello");
    }

    #[test]
    fn test_free_users_cannot_use_premium_options() {
        let now = Utc::now();
        let user = fixtures::user(now, false);

        let mut req = request("a\nb");
        req.poll_type = PollType::Multiple;
        assert!(build_poll(req, &user, "s".into(), now).is_err());

        let mut req = request("a\nb");
        req.require_login = true;
        assert!(build_poll(req, &user, "s".into(), now).is_err());

        let mut req = request("a\nb");
        req.expires_in_days = Some(31);
        assert!(build_poll(req, &user, "s".into(), now).is_err());

        let premium = fixtures::user(now, true);
        let mut req = request("a\nb");
        req.expires_in_days = Some(31);
        assert!(build_poll(req, &premium, "s".into(), now).is_ok());
    }

    #[test]
    fn test_yes_no_rejects_multiple_votes() {
        let now = Utc::now();
        let user = fixtures::user(now, true);
        let mut req = request("Yes\nNo");
        req.poll_type = PollType::YesNo;
        req.allow_multiple_votes = true;
        assert!(build_poll(req, &user, "s".into(), now).is_err());
    }

    #[test]
    fn test_poll_quota() {
        let now = Utc::now();
        let free = fixtures::user(now, false);
        assert_eq!(poll_limit(&free, now), FREE_MAX_POLLS);
        assert!(quota_error(&free, now).to_string().contains("Upgrade"));

        let mut premium = fixtures::user(now, true);
        assert_eq!(poll_limit(&premium, now), PREMIUM_MAX_POLLS);

        premium.premium_until = Some(now - Duration::days(1));
        assert_eq!(poll_limit(&premium, now), FREE_MAX_POLLS);
    }

    #[test]
    fn test_quick_poll_choices() {
        let now = Utc::now();
        let user = fixtures::user(now, false);

        let yes_no = QuickPollRequest {
            question: "Ship it?".to_string(),
            poll_type: PollType::YesNo,
            option_1: None,
            option_2: None,
            option_3: None,
            expires_in_hours: Some(24),
        };
        let poll = build_quick_poll(yes_no, &user, "s".into(), now).unwrap();
        assert_eq!(poll.choices, vec!["Yes", "No"]);
        assert_eq!(poll.expires_at, Some(now + Duration::hours(24)));

        let single = QuickPollRequest {
            question: "Lunch?".to_string(),
            poll_type: PollType::Single,
            option_1: Some("Soup".to_string()),
            option_2: None,
            option_3: Some("Salad".to_string()),
            expires_in_hours: None,
        };
        assert!(build_quick_poll(single, &user, "s".into(), now).is_err());

        let bad_expiry = QuickPollRequest {
            question: "Lunch?".to_string(),
            poll_type: PollType::YesNo,
            option_1: None,
            option_2: None,
            option_3: None,
            expires_in_hours: Some(5),
        };
        assert!(build_quick_poll(bad_expiry, &user, "s".into(), now).is_err());
    }

    #[test]
    fn test_title_locked_after_votes() {
        let now = Utc::now();
        let mut poll = fixtures::poll(now);
        poll.total_votes = 3;

        let edit = UpdatePollRequest {
            title: Some("Something else entirely".to_string()),
            ..Default::default()
        };
        assert!(apply_edit(&mut poll, edit, now).is_err());

        let edit = UpdatePollRequest {
            title: Some(poll.title.clone()),
            show_results: Some(false),
            ..Default::default()
        };
        apply_edit(&mut poll, edit, now).unwrap();
        assert!(!poll.show_results);
    }

    #[test]
    fn test_edit_into_the_past_expires_poll() {
        let now = Utc::now();
        let mut poll = fixtures::poll(now);
        let edit = UpdatePollRequest {
            expires_at: Some(Some(now - Duration::minutes(5))),
            ..Default::default()
        };
        apply_edit(&mut poll, edit, now).unwrap();
        assert_eq!(poll.status, PollStatus::Expired);
        assert!(!poll.is_active);
    }
}
