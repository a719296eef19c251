//! External billing source of truth.
//!
//! The reconciler only sees `BillingSource`; HttpBilling is the production
//! implementation against a JSON:API style members endpoint.

use crate::{
    config::BillingConfig,
    error::{LedgerError, LedgerResult},
    types::{Cents, Email},
};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Former,
    Declined,
    Unknown,
}

impl SubscriptionStatus {
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("active_patron")   => Self::Active,
            Some("former_patron")   => Self::Former,
            Some("declined_patron") => Self::Declined,
            _                       => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberSummary {
    pub email:               Email,
    pub lifetime_cents_paid: Cents,
    pub status:              SubscriptionStatus,
}

impl SubscriberSummary {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// The contract every billing collaborator must fulfill.
pub trait BillingSource: Send + Sync {
    /// Current subscriber summaries. An error aborts the reconciliation pass.
    fn fetch_subscribers(&self) -> LedgerResult<Vec<SubscriberSummary>>;
}

// ── Wire format ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MembersPage {
    #[serde(default)]
    data: Vec<MemberResource>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct MemberResource {
    attributes: MemberAttributes,
}

#[derive(Debug, Deserialize)]
struct MemberAttributes {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    lifetime_support_cents: Option<Cents>,
    #[serde(default)]
    patron_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

/// Parse one members page into summaries plus the next-page link.
/// Members without an email cannot match a ledger record and are dropped.
pub fn parse_members_page(body: &str) -> LedgerResult<(Vec<SubscriberSummary>, Option<String>)> {
    let page: MembersPage = serde_json::from_str(body)?;
    let summaries = page
        .data
        .into_iter()
        .filter_map(|member| {
            let attrs = member.attributes;
            let email = attrs.email.filter(|e| !e.is_empty())?;
            Some(SubscriberSummary {
                email,
                lifetime_cents_paid: attrs.lifetime_support_cents.unwrap_or(0),
                status: SubscriptionStatus::from_api(attrs.patron_status.as_deref()),
            })
        })
        .collect();
    let next = page.links.and_then(|l| l.next);
    Ok((summaries, next))
}

// ── HTTP implementation ────────────────────────────────────────────

pub struct HttpBilling {
    agent:        ureq::Agent,
    members_url:  String,
    access_token: String,
    max_pages:    usize,
}

impl HttpBilling {
    pub fn new(config: &BillingConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            members_url:  config.members_url.clone(),
            access_token: config.access_token.clone(),
            max_pages:    config.max_pages,
        }
    }

    fn get_page(&self, url: &str) -> LedgerResult<String> {
        let response = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .set("Accept", "application/json")
            .call()
            .map_err(billing_error_from_ureq)?;
        response
            .into_string()
            .map_err(|e| LedgerError::Billing { reason: format!("reading body: {e}") })
    }
}

impl BillingSource for HttpBilling {
    fn fetch_subscribers(&self) -> LedgerResult<Vec<SubscriberSummary>> {
        let mut all = Vec::new();
        let mut url = Some(self.members_url.clone());
        let mut pages = 0;

        while let Some(current) = url.take() {
            // A partial member list would prune everyone on the unread pages.
            if pages == self.max_pages {
                return Err(LedgerError::Billing {
                    reason: format!("page cap of {pages} reached with more members remaining"),
                });
            }
            let body = self.get_page(&current)?;
            let (summaries, next) = parse_members_page(&body)?;
            all.extend(summaries);
            url = next;
            pages += 1;
        }

        log::debug!("billing: fetched {} members over {pages} page(s)", all.len());
        Ok(all)
    }
}

fn billing_error_from_ureq(err: ureq::Error) -> LedgerError {
    let reason = match err {
        ureq::Error::Status(status, _) => format!("request failed with status code {status}"),
        ureq::Error::Transport(transport) => format!("transport: {transport}"),
    };
    LedgerError::Billing { reason }
}
