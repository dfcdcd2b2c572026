//! Operations behind the HTTP handlers. Every function takes the clock as an
//! argument so tests can pin it.
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::{AppError, StoreError};
use crate::forms;
use crate::identity::Requester;
use crate::models::{
    AccountSummary, Ballot, BallotReceipt, Choice, CreatePollRequest, NewPoll, Poll, PollDetail,
    PollResults, PollStats, PollStatus, QuickPollRequest, ShareLinks, UpdatePollRequest, User,
    Vote, Voter,
};
use crate::poll::generate_slug;
use crate::store::PollStore;

const SLUG_ATTEMPTS: usize = 16;

async fn load_poll(store: &dyn PollStore, slug: &str) -> Result<Poll, AppError> {
    store.find_poll(slug).await?.ok_or(AppError::NotFound("Poll"))
}

async fn require_user(store: &dyn PollStore, requester: &Requester) -> Result<User, AppError> {
    let user_id = requester.user_id.ok_or(AppError::LoginRequired)?;
    store
        .find_user(user_id)
        .await?
        .ok_or(AppError::LoginRequired)
}

fn require_creator(poll: &Poll, requester: &Requester) -> Result<(), AppError> {
    match requester.user_id {
        None => Err(AppError::LoginRequired),
        Some(id) if id == poll.creator_id => Ok(()),
        Some(_) => Err(AppError::Forbidden),
    }
}

async fn unique_slug(store: &dyn PollStore) -> Result<String, AppError> {
    for _ in 0..SLUG_ATTEMPTS {
        let slug = generate_slug();
        if !store.slug_exists(&slug).await? {
            return Ok(slug);
        }
    }
    Err(AppError::Internal("could not allocate a unique slug".to_string()))
}

/// Checks a ballot's choice ids against the poll's type and choices.
pub fn validate_selection(poll: &Poll, choices: &[Choice], selection: &[i64]) -> Result<(), AppError> {
    if selection.is_empty() {
        return Err(AppError::InvalidSelection(
            "Select at least one choice.".to_string(),
        ));
    }

    let distinct: HashSet<i64> = selection.iter().copied().collect();
    if distinct.len() != selection.len() {
        return Err(AppError::InvalidSelection(
            "A choice can only be selected once.".to_string(),
        ));
    }

    if !poll.poll_type.allows_multiple_selection() && selection.len() != 1 {
        return Err(AppError::InvalidSelection(
            "This poll accepts exactly one choice.".to_string(),
        ));
    }

    for id in selection {
        let valid = choices
            .iter()
            .any(|choice| choice.id == *id && choice.poll_id == poll.id && choice.is_active);
        if !valid {
            return Err(AppError::InvalidSelection(format!(
                "Choice {id} is not available on this poll."
            )));
        }
    }

    Ok(())
}

pub async fn cast_vote(
    store: &dyn PollStore,
    slug: &str,
    selection: &[i64],
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<BallotReceipt, AppError> {
    let result = try_cast_vote(store, slug, selection, requester, now).await;
    match &result {
        Ok(receipt) => info!(
            poll = %slug,
            choices = ?selection,
            first_vote = receipt.first_vote,
            total_votes = receipt.total_votes,
            "vote recorded"
        ),
        Err(err) if !err.status().is_server_error() => {
            warn!(poll = %slug, choices = ?selection, reason = %err, "vote rejected")
        }
        Err(_) => {}
    }
    result
}

async fn try_cast_vote(
    store: &dyn PollStore,
    slug: &str,
    selection: &[i64],
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<BallotReceipt, AppError> {
    let poll = load_poll(store, slug).await?;
    if !poll.can_vote(now) {
        return Err(AppError::PollClosed);
    }

    let voter = match requester.user_id {
        Some(_) => Voter::Registered(require_user(store, requester).await?.id),
        None => {
            if poll.require_login || !poll.allow_anonymous {
                return Err(AppError::LoginRequired);
            }
            Voter::Anonymous {
                ip: requester.ip.clone().ok_or(AppError::UnknownClient)?,
                session_key: requester.session_key.clone(),
            }
        }
    };

    let choices = store.list_choices(poll.id).await?;
    validate_selection(&poll, &choices, selection)?;

    let ballot = Ballot {
        poll_id: poll.id,
        choice_ids: selection.to_vec(),
        voter,
        voter_ip: requester.ip.clone().unwrap_or_default(),
        voter_session: requester.session_key.clone(),
        user_agent: requester.user_agent.clone(),
    };

    store.record_ballot(ballot, now).await.map_err(|err| match err {
        // A choice was deactivated or removed after validation.
        StoreError::NotFound => {
            AppError::InvalidSelection("The selected choice is no longer available.".to_string())
        }
        other => other.into(),
    })
}

async fn insert_new_poll(
    store: &dyn PollStore,
    new: NewPoll,
    user: &User,
    now: DateTime<Utc>,
) -> Result<PollDetail, AppError> {
    let poll = store
        .insert_poll(new, forms::poll_limit(user, now))
        .await
        .map_err(|err| match err {
            StoreError::QuotaExceeded => forms::quota_error(user, now),
            other => other.into(),
        })?;
    info!(poll = %poll.slug, creator = %poll.creator_id, "poll created");
    let choices = store.list_choices(poll.id).await?;
    Ok(PollDetail {
        can_vote: poll.can_vote(now),
        poll,
        choices,
    })
}

pub async fn create_poll(
    store: &dyn PollStore,
    req: CreatePollRequest,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<PollDetail, AppError> {
    let user = require_user(store, requester).await?;
    let slug = unique_slug(store).await?;
    let new = forms::build_poll(req, &user, slug, now)?;
    insert_new_poll(store, new, &user, now).await
}

pub async fn create_quick_poll(
    store: &dyn PollStore,
    req: QuickPollRequest,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<PollDetail, AppError> {
    let user = require_user(store, requester).await?;
    let slug = unique_slug(store).await?;
    let new = forms::build_quick_poll(req, &user, slug, now)?;
    insert_new_poll(store, new, &user, now).await
}

pub async fn get_poll(
    store: &dyn PollStore,
    slug: &str,
    now: DateTime<Utc>,
) -> Result<PollDetail, AppError> {
    let poll = load_poll(store, slug).await?;
    let choices = store.list_choices(poll.id).await?;
    Ok(PollDetail {
        can_vote: poll.can_vote(now),
        poll,
        choices,
    })
}

pub async fn list_my_polls(store: &dyn PollStore, requester: &Requester) -> Result<Vec<Poll>, AppError> {
    let user = require_user(store, requester).await?;
    Ok(store.list_polls_by_creator(user.id).await?)
}

pub async fn update_poll(
    store: &dyn PollStore,
    slug: &str,
    edit: UpdatePollRequest,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    let mut poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    forms::apply_edit(&mut poll, edit, now)?;
    Ok(store.save_poll(&poll).await?)
}

pub async fn publish_poll(
    store: &dyn PollStore,
    slug: &str,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    let mut poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    if poll.status != PollStatus::Draft {
        return Err(AppError::Conflict("Only draft polls can be published.".to_string()));
    }
    poll.status = PollStatus::Active;
    poll.is_active = true;
    poll.apply_expiry(now);
    Ok(store.save_poll(&poll).await?)
}

pub async fn toggle_poll(
    store: &dyn PollStore,
    slug: &str,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    let mut poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    poll.is_active = !poll.is_active;
    poll.apply_expiry(now);
    Ok(store.save_poll(&poll).await?)
}

pub async fn close_poll(
    store: &dyn PollStore,
    slug: &str,
    requester: &Requester,
) -> Result<Poll, AppError> {
    let mut poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    poll.status = PollStatus::Closed;
    Ok(store.save_poll(&poll).await?)
}

pub async fn delete_poll(store: &dyn PollStore, slug: &str, requester: &Requester) -> Result<(), AppError> {
    let poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    store.delete_poll(poll.id).await?;
    info!(poll = %slug, "poll deleted");
    Ok(())
}

pub async fn results(
    store: &dyn PollStore,
    slug: &str,
    requester: &Requester,
) -> Result<PollResults, AppError> {
    let poll = load_poll(store, slug).await?;
    if !poll.show_results && requester.user_id != Some(poll.creator_id) {
        return Err(AppError::Forbidden);
    }
    let choices = store.list_choices(poll.id).await?;
    Ok(poll.results(&choices))
}

pub async fn stats(store: &dyn PollStore, slug: &str, now: DateTime<Utc>) -> Result<PollStats, AppError> {
    Ok(load_poll(store, slug).await?.stats(now))
}

pub async fn share(store: &dyn PollStore, slug: &str, base_url: &str) -> Result<ShareLinks, AppError> {
    load_poll(store, slug)
        .await?
        .share_links(base_url)
        .map_err(|e| AppError::Internal(format!("invalid public base url: {e}")))
}

pub async fn vote_log(store: &dyn PollStore, slug: &str, requester: &Requester) -> Result<Vec<Vote>, AppError> {
    let poll = load_poll(store, slug).await?;
    require_creator(&poll, requester)?;
    Ok(store.list_votes(poll.id).await?)
}

pub async fn account(
    store: &dyn PollStore,
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<AccountSummary, AppError> {
    Ok(require_user(store, requester).await?.summary(now))
}
