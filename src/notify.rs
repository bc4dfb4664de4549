//! Notification service - renders and sends the workflow emails
//!
//! Two templates: the stakeholder action request (field table plus
//! Approve/Deny links) and the requestor outcome. Delivery is best-effort
//! per recipient; one failed send never aborts the rest of a batch.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{is_decision_header, Decision, Stage};
use crate::rows::{EMAIL_ADDRESS, REQUESTOR_NAME, REQUISITION_TITLE};

/// A rendered email ready for the transport
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Mail transport seam. The workflow only ever sees this trait.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Transport that POSTs messages to an HTTP mail relay
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RelayMessage {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html_body,
            })
            .send()
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Mail(format!(
                "Relay rejected message: {} - {}",
                status, text
            )));
        }

        Ok(())
    }
}

/// Transport that records messages in memory. Used by tests and local runs
/// without a relay.
#[derive(Default)]
pub struct MemoryMailer {
    sent: std::sync::Mutex<Vec<OutboundEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Renders and dispatches the two workflow templates
pub struct NotificationService {
    transport: Arc<dyn MailTransport>,
    base_url: String,
}

impl NotificationService {
    pub fn new(transport: Arc<dyn MailTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    /// Build one action link. The approve and deny links of a pair share
    /// the token and differ only in `decision`.
    fn action_url(
        &self,
        row: i64,
        stage: Stage,
        decision: Decision,
        approver: &str,
        token: &str,
    ) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Internal(format!("Invalid base URL: {}", e)))?;
        url.set_path("/action");
        url.query_pairs_mut()
            .append_pair("row", &row.to_string())
            .append_pair("stage", stage.as_str())
            .append_pair("decision", decision.as_str())
            .append_pair("approver", approver)
            .append_pair("token", token);

        Ok(url.to_string())
    }

    /// Send the action-request email to each stakeholder with a token. A
    /// failed send is logged and skipped.
    pub async fn send_stage_request(
        &self,
        stage: Stage,
        row_id: i64,
        row_data: &HashMap<String, String>,
        tokens_by_approver: &[(String, String)],
    ) -> Result<()> {
        for (approver, token) in tokens_by_approver {
            let approve_url =
                self.action_url(row_id, stage, Decision::Approved, approver, token)?;
            let deny_url = self.action_url(row_id, stage, Decision::Denied, approver, token)?;

            let email = OutboundEmail {
                to: approver.clone(),
                subject: stage_request_subject(stage, row_id, row_data),
                html_body: render_stage_request(stage, row_data, &approve_url, &deny_url),
            };

            if let Err(e) = self.transport.send(&email).await {
                tracing::warn!("Failed to notify {} for row {}: {}", approver, row_id, e);
            }
        }

        Ok(())
    }

    /// Send the final outcome to the requestor. A missing address or a
    /// failed send is logged and swallowed.
    pub async fn send_requestor_outcome(
        &self,
        row_data: &HashMap<String, String>,
        decision: Decision,
    ) -> Result<()> {
        let to = match row_data.get(EMAIL_ADDRESS).filter(|v| !v.is_empty()) {
            Some(address) => address.clone(),
            None => {
                tracing::warn!("Row has no requestor email address, skipping outcome mail");
                return Ok(());
            }
        };

        let email = OutboundEmail {
            to: to.clone(),
            subject: format!("Your requisition has been {}", decision.as_str()),
            html_body: render_requestor_outcome(row_data, decision),
        };

        if let Err(e) = self.transport.send(&email).await {
            tracing::warn!("Failed to send outcome mail to {}: {}", to, e);
        }

        Ok(())
    }
}

fn stage_request_subject(stage: Stage, row_id: i64, row_data: &HashMap<String, String>) -> String {
    match row_data.get(REQUISITION_TITLE).filter(|v| !v.is_empty()) {
        Some(title) => format!("{} approval needed: {}", stage.ordinal(), title),
        None => format!("{} approval needed: requisition #{}", stage.ordinal(), row_id),
    }
}

fn render_stage_request(
    stage: Stage,
    row_data: &HashMap<String, String>,
    approve_url: &str,
    deny_url: &str,
) -> String {
    format!(
        r#"<html><body>
<p>A requisition is awaiting your {} approval.</p>
{}
<p><a href="{}">Approve</a> &nbsp;|&nbsp; <a href="{}">Deny</a></p>
</body></html>"#,
        stage.ordinal(),
        render_field_table(row_data),
        escape_html(approve_url),
        escape_html(deny_url),
    )
}

fn render_requestor_outcome(row_data: &HashMap<String, String>, decision: Decision) -> String {
    let name = row_data
        .get(REQUESTOR_NAME)
        .filter(|v| !v.is_empty())
        .map(|v| escape_html(v))
        .unwrap_or_else(|| "there".to_string());

    format!(
        r#"<html><body>
<p>Hello {},</p>
<p>Your requisition has been <b>{}</b>.</p>
{}
</body></html>"#,
        name,
        decision.as_str(),
        render_field_table(row_data),
    )
}

/// Table of the row's non-decision fields, sorted by header for stable
/// output
fn render_field_table(row_data: &HashMap<String, String>) -> String {
    let mut entries: Vec<(&String, &String)> = row_data
        .iter()
        .filter(|(header, _)| !is_decision_header(header))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let rows: String = entries
        .iter()
        .map(|(header, value)| {
            format!(
                "<tr><td><b>{}</b></td><td>{}</td></tr>\n",
                escape_html(header),
                escape_html(value)
            )
        })
        .collect();

    format!("<table border=\"1\" cellpadding=\"4\">\n{}</table>", rows)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_data() -> HashMap<String, String> {
        HashMap::from([
            ("Department".to_string(), "Ops".to_string()),
            ("Requisition Title".to_string(), "Rope kit".to_string()),
            ("Requestor Name".to_string(), "Jo Field".to_string()),
            (EMAIL_ADDRESS.to_string(), "jo@claimclimbers.com".to_string()),
            ("1st Approval Status".to_string(), "Pending".to_string()),
        ])
    }

    fn service(transport: Arc<dyn MailTransport>) -> NotificationService {
        NotificationService::new(transport, "http://approvals.test")
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a&b"), "a&amp;b");
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_action_url_format() {
        let svc = service(Arc::new(MemoryMailer::new()));
        let url = svc
            .action_url(12, Stage::First, Decision::Approved, "sam@claimclimbers.com", "tok123")
            .unwrap();

        assert!(url.starts_with("http://approvals.test/action?"));
        assert!(url.contains("row=12"));
        assert!(url.contains("stage=1"));
        assert!(url.contains("decision=Approved"));
        assert!(url.contains("approver=sam%40claimclimbers.com"));
        assert!(url.contains("token=tok123"));
    }

    #[test]
    fn test_action_url_pair_shares_token() {
        let svc = service(Arc::new(MemoryMailer::new()));
        let approve = svc
            .action_url(3, Stage::Second, Decision::Approved, "sam@x.com", "t")
            .unwrap();
        let deny = svc
            .action_url(3, Stage::Second, Decision::Denied, "sam@x.com", "t")
            .unwrap();

        assert_ne!(approve, deny);
        assert_eq!(
            approve.replace("decision=Approved", "decision=Denied"),
            deny
        );
    }

    #[test]
    fn test_action_url_invalid_base() {
        let svc = NotificationService::new(Arc::new(MemoryMailer::new()), "not a url");
        let result = svc.action_url(1, Stage::First, Decision::Approved, "a@x.com", "t");
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_stage_request_subject_uses_title() {
        let subject = stage_request_subject(Stage::First, 12, &row_data());
        assert_eq!(subject, "1st approval needed: Rope kit");
    }

    #[test]
    fn test_stage_request_subject_without_title() {
        let subject = stage_request_subject(Stage::Second, 12, &HashMap::new());
        assert_eq!(subject, "2nd approval needed: requisition #12");
    }

    #[test]
    fn test_render_stage_request_contains_links_and_fields() {
        let body = render_stage_request(
            Stage::First,
            &row_data(),
            "http://x/approve",
            "http://x/deny",
        );

        assert!(body.contains("1st approval"));
        assert!(body.contains("http://x/approve"));
        assert!(body.contains("http://x/deny"));
        assert!(body.contains("Ops"));
        assert!(body.contains("Rope kit"));
        // Decision cells stay out of the table
        assert!(!body.contains("1st Approval Status"));
    }

    #[test]
    fn test_render_requestor_outcome() {
        let body = render_requestor_outcome(&row_data(), Decision::Denied);
        assert!(body.contains("Hello Jo Field"));
        assert!(body.contains("<b>Denied</b>"));
    }

    #[test]
    fn test_render_requestor_outcome_without_name() {
        let body = render_requestor_outcome(&HashMap::new(), Decision::Approved);
        assert!(body.contains("Hello there"));
    }

    #[test]
    fn test_field_values_are_escaped() {
        let data = HashMap::from([(
            "Department".to_string(),
            "<img src=x>".to_string(),
        )]);
        let table = render_field_table(&data);
        assert!(!table.contains("<img"));
        assert!(table.contains("&lt;img src=x&gt;"));
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer
            .send(&OutboundEmail {
                to: "sam@x.com".to_string(),
                subject: "Hi".to_string(),
                html_body: "<p>Hi</p>".to_string(),
            })
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "sam@x.com");
    }

    #[tokio::test]
    async fn test_send_stage_request_one_per_approver() {
        let mailer = Arc::new(MemoryMailer::new());
        let svc = service(mailer.clone());
        let tokens = vec![
            ("sam@x.com".to_string(), "t1".to_string()),
            ("matt@x.com".to_string(), "t2".to_string()),
        ];

        svc.send_stage_request(Stage::First, 12, &row_data(), &tokens)
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "sam@x.com");
        assert!(sent[0].html_body.contains("token=t1"));
        assert_eq!(sent[1].to, "matt@x.com");
        assert!(sent[1].html_body.contains("token=t2"));
    }

    /// Transport that fails for one address and records the rest
    struct FlakyTransport {
        inner: MemoryMailer,
        fail_for: String,
    }

    #[async_trait]
    impl MailTransport for FlakyTransport {
        async fn send(&self, email: &OutboundEmail) -> Result<()> {
            if email.to == self.fail_for {
                return Err(AppError::Mail("mailbox on fire".to_string()));
            }
            self.inner.send(email).await
        }
    }

    #[tokio::test]
    async fn test_send_stage_request_is_fail_independent() {
        let transport = Arc::new(FlakyTransport {
            inner: MemoryMailer::new(),
            fail_for: "sam@x.com".to_string(),
        });
        let svc = service(transport.clone());
        let tokens = vec![
            ("sam@x.com".to_string(), "t1".to_string()),
            ("matt@x.com".to_string(), "t2".to_string()),
            ("amy@x.com".to_string(), "t3".to_string()),
        ];

        // The failing recipient does not abort the batch
        svc.send_stage_request(Stage::First, 12, &row_data(), &tokens)
            .await
            .unwrap();

        let sent = transport.inner.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "matt@x.com");
        assert_eq!(sent[1].to, "amy@x.com");
    }

    #[tokio::test]
    async fn test_send_requestor_outcome() {
        let mailer = Arc::new(MemoryMailer::new());
        let svc = service(mailer.clone());

        svc.send_requestor_outcome(&row_data(), Decision::Approved)
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jo@claimclimbers.com");
        assert_eq!(sent[0].subject, "Your requisition has been Approved");
    }

    #[tokio::test]
    async fn test_send_requestor_outcome_without_address() {
        let mailer = Arc::new(MemoryMailer::new());
        let svc = service(mailer.clone());

        svc.send_requestor_outcome(&HashMap::new(), Decision::Denied)
            .await
            .unwrap();

        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_requestor_outcome_swallows_delivery_failure() {
        let transport = Arc::new(FlakyTransport {
            inner: MemoryMailer::new(),
            fail_for: "jo@claimclimbers.com".to_string(),
        });
        let svc = service(transport);

        let result = svc
            .send_requestor_outcome(&row_data(), Decision::Approved)
            .await;
        assert!(result.is_ok());
    }
}
