use crate::auth::TokenProvider;
use crate::proposal::Feasibility;
use crate::session::ProposalSession;

/// A composed mail, ready for whatever transport the platform offers.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Build the "share feasibility reasons" mail for the most recently
/// generated proposal. Without a signed-in email there is nobody to
/// address it to and the draft is None.
pub fn feasibility_email(
    session: &ProposalSession,
    auth: &dyn TokenProvider,
    feasibility: &Feasibility,
) -> Option<EmailDraft> {
    let to = auth.user_email()?;
    let last = session.last_proposal_file().unwrap_or_default();
    let about = if last.is_empty() { "proposal" } else { last.as_str() };
    let subject = format!("Feasibility reasons for {about}");

    let verdict = match feasibility.feasible {
        Some(true) => "true",
        Some(false) => "false",
        None => "unknown",
    };
    let mut body = format!("Feasibility: {verdict}\n\n");
    if feasibility.reasons.is_empty() {
        body.push_str("No additional reasons provided.");
    } else {
        for (i, reason) in feasibility.reasons.iter().enumerate() {
            body.push_str(&format!("{}. {reason}\n", i + 1));
        }
    }

    Some(EmailDraft { to, subject, body })
}
