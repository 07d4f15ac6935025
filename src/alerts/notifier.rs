use std::{future::Future, path::PathBuf, pin::Pin, process::Stdio, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use tokio::{io::AsyncWriteExt, process::Command, task::JoinHandle};

use crate::config::Config;

use super::MovementAlert;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Delivery backend for movement alerts. Dropping the returned future must abandon
/// the attempt; the caller only learns success or failure.
pub trait Notifier: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn deliver<'a>(&'a self, alert: &'a MovementAlert) -> DeliveryFuture<'a>;
}

/// Writes alerts to the log. Used when no recipient is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver<'a>(&'a self, alert: &'a MovementAlert) -> DeliveryFuture<'a> {
        Box::pin(async move {
            log::warn!("ALERT: {}", alert.summary());
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// Hands an HTML email to the local `sendmail -t` binary.
pub struct SendmailNotifier {
    program: PathBuf,
    to: String,
    from: Option<String>,
}

impl SendmailNotifier {
    pub fn new(program: PathBuf, to: String, from: Option<String>) -> Self {
        Self { program, to, from }
    }

    pub fn render_message(&self, alert: &MovementAlert) -> String {
        let mut message = String::new();
        message.push_str(&format!("To: {}\r\n", self.to));
        if let Some(from) = &self.from {
            message.push_str(&format!("From: {from}\r\n"));
        }
        message.push_str(&format!("Subject: {}\r\n", alert.subject()));
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
        message.push_str("\r\n");
        message.push_str(&alert.html_body());
        message
    }

    async fn send(&self, alert: &MovementAlert) -> Result<()> {
        // Killed if the attempt is dropped, e.g. on timeout.
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("sendmail stdin unavailable"))?;
        let written = stdin.write_all(self.render_message(alert).as_bytes()).await;
        drop(stdin);

        // Reap the child before reporting a write failure.
        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for sendmail")?;
        written.context("failed to write message to sendmail")?;

        if !output.status.success() {
            bail!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Notifier for SendmailNotifier {
    fn name(&self) -> &'static str {
        "sendmail"
    }

    fn deliver<'a>(&'a self, alert: &'a MovementAlert) -> DeliveryFuture<'a> {
        Box::pin(self.send(alert))
    }
}

/// Pick the backend from config: email when a recipient is set, otherwise the log.
pub fn from_config(config: &Config) -> Arc<dyn Notifier> {
    match &config.alert_email_to {
        Some(to) => Arc::new(SendmailNotifier::new(
            config.sendmail_path.clone(),
            to.clone(),
            config.alert_email_from.clone(),
        )),
        None => Arc::new(LogNotifier),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

/// One bounded attempt on a background task. The outcome is logged; nothing retries.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    alert: MovementAlert,
    timeout: Duration,
) -> JoinHandle<DeliveryOutcome> {
    tokio::spawn(async move {
        let backend = notifier.name();
        let summary = alert.summary();

        let outcome = match tokio::time::timeout(timeout, notifier.deliver(&alert)).await {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(err)) => DeliveryOutcome::Failed(format!("{err:#}")),
            Err(_) => DeliveryOutcome::TimedOut,
        };

        match &outcome {
            DeliveryOutcome::Delivered => log_info!("alert sent via {}: {}", backend, summary),
            DeliveryOutcome::Failed(reason) => {
                log_error!("alert via {} failed: {}", backend, reason)
            }
            DeliveryOutcome::TimedOut => log_warn!(
                "alert via {} timed out after {}s",
                backend,
                timeout.as_secs_f32()
            ),
        }

        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert() -> MovementAlert {
        MovementAlert {
            device_id: "tracker-1".into(),
            triggered_at: Utc::now(),
            map_link: Some("https://maps.google.com/?q=1,2".into()),
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn deliver<'a>(&'a self, _alert: &'a MovementAlert) -> DeliveryFuture<'a> {
            Box::pin(async { Err::<(), _>(anyhow!("smtp unreachable")) })
        }
    }

    struct Stalled;

    impl Notifier for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn deliver<'a>(&'a self, _alert: &'a MovementAlert) -> DeliveryFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), anyhow::Error>(())
            })
        }
    }

    #[cfg(unix)]
    fn fake_sendmail(script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fake-sendmail-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid: &str) -> bool {
        // Zombies still have a /proc entry; state 'Z' counts as gone.
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.trim_start().chars().next())
                .map(|state| state != 'Z')
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn log_notifier_delivers() {
        let outcome = dispatch(Arc::new(LogNotifier), alert(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let outcome = dispatch(Arc::new(Failing), alert(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Failed("smtp unreachable".into()));
    }

    #[tokio::test]
    async fn slow_backends_time_out() {
        let outcome = dispatch(Arc::new(Stalled), alert(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::TimedOut);
    }

    #[tokio::test]
    async fn missing_sendmail_binary_fails_cleanly() {
        let notifier = SendmailNotifier::new(
            PathBuf::from("/nonexistent/sendmail"),
            "owner@example.com".into(),
            None,
        );
        let outcome = dispatch(Arc::new(notifier), alert(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sendmail_receives_rendered_message() {
        let mailbox = std::env::temp_dir().join(format!("mailbox-{}", uuid::Uuid::new_v4()));
        let script = fake_sendmail(&format!("cat > {}", mailbox.display()));
        let notifier = SendmailNotifier::new(script.clone(), "owner@example.com".into(), None);

        let outcome = dispatch(Arc::new(notifier), alert(), Duration::from_secs(5))
            .await
            .unwrap();
        let delivered = std::fs::read_to_string(&mailbox).unwrap_or_default();
        let _ = std::fs::remove_file(&script);
        let _ = std::fs::remove_file(&mailbox);

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(delivered.contains("Subject: GPS Tracker Movement Alert"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sendmail_exit_status_is_a_failure() {
        let script = fake_sendmail("cat > /dev/null\necho relay denied >&2\nexit 1");
        let notifier = SendmailNotifier::new(script.clone(), "owner@example.com".into(), None);

        let outcome = dispatch(Arc::new(notifier), alert(), Duration::from_secs(5))
            .await
            .unwrap();
        let _ = std::fs::remove_file(&script);

        match outcome {
            DeliveryOutcome::Failed(reason) => assert!(reason.contains("relay denied")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timed_out_sendmail_is_killed() {
        let pid_file = std::env::temp_dir().join(format!("sendmail-pid-{}", uuid::Uuid::new_v4()));
        let script = fake_sendmail(&format!(
            "echo $$ > {}\ncat > /dev/null\nexec sleep 5",
            pid_file.display()
        ));
        let notifier = SendmailNotifier::new(script.clone(), "owner@example.com".into(), None);

        let started = std::time::Instant::now();
        let outcome = dispatch(Arc::new(notifier), alert(), Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::TimedOut);

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut alive = true;
        for _ in 0..100 {
            alive = process_alive(&pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = std::fs::remove_file(&script);
        let _ = std::fs::remove_file(&pid_file);

        assert!(!alive, "sendmail child {pid} outlived the timeout");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn sendmail_message_has_headers_and_body() {
        let notifier = SendmailNotifier::new(
            PathBuf::from("sendmail"),
            "owner@example.com".into(),
            Some("tracker@example.com".into()),
        );
        let message = notifier.render_message(&alert());
        assert!(message.starts_with("To: owner@example.com\r\n"));
        assert!(message.contains("From: tracker@example.com\r\n"));
        assert!(message.contains("Subject: GPS Tracker Movement Alert\r\n"));
        assert!(message.contains("\r\n\r\n<h2>Movement Alert from GPS Tracker</h2>"));
    }

    #[test]
    fn backend_follows_recipient_config() {
        let config = Config::default();
        assert_eq!(from_config(&config).name(), "log");

        let config = Config {
            alert_email_to: Some("owner@example.com".into()),
            ..Config::default()
        };
        assert_eq!(from_config(&config).name(), "sendmail");
    }
}
