//! Rendering of upgrade status, notifications and step headers.

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::vcenter::types::{
    ErrorInfo, Notification, Notifications, OperationStatus, Progress, UpgradeInfo, UpgradeStatus,
};

/// Row for the notifications table.
#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
    #[tabled(rename = "RESOLUTION")]
    resolution: String,
}

/// Prints a step header in "Step [current/total]: name" format.
pub fn print_step(index: usize, steps: &[&str]) {
    println!();
    println!(
        "{}",
        format!("Step [{}/{}]: {}", index + 1, steps.len(), steps[index])
            .cyan()
            .bold()
    );
}

/// Print notifications as a table, errors first.
pub fn print_notifications(notifications: &Notifications) {
    if notifications.is_empty() {
        println!("  {} No notifications", "✓".green());
        return;
    }

    let rows: Vec<NotificationRow> = [
        ("ERROR".red().to_string(), &notifications.errors),
        ("WARNING".yellow().to_string(), &notifications.warnings),
        ("INFO".blue().to_string(), &notifications.info),
    ]
    .iter()
    .flat_map(|(severity, items)| {
        items.iter().map(move |n| NotificationRow {
            severity: severity.clone(),
            message: n.message.default_message.clone(),
            resolution: resolution_text(n).to_string(),
        })
    })
    .collect();

    let mut table = Table::new(&rows);
    table.with(Style::sharp());
    println!("{}", table);
}

fn resolution_text(notification: &Notification) -> &str {
    notification
        .resolution
        .as_ref()
        .map(|r| r.default_message.as_str())
        .unwrap_or("None")
}

/// Plain-text notifications for log lines.
pub fn notifications_to_string(notifications: Option<&Notifications>, indent: usize) -> String {
    let Some(notifications) = notifications else {
        return "No available notifications".to_string();
    };

    let pad = " ".repeat(indent);
    let section = |title: &str, items: &[Notification]| {
        let mut out = format!("{}- {}:\n", pad, title);
        for n in items {
            out.push_str(&format!(
                "{}  Message: {}\n{}  Resolution: {}\n",
                pad,
                n.message.default_message,
                pad,
                resolution_text(n)
            ));
        }
        out
    };

    format!(
        "{}{}{}",
        section("Error", &notifications.errors),
        section("Warning", &notifications.warnings),
        section("Info", &notifications.info)
    )
}

/// One "- message" line per entry.
pub fn messages_to_string(messages: &[&str], indent: usize) -> String {
    let pad = " ".repeat(indent);
    messages
        .iter()
        .map(|m| format!("\n{}- {}", pad, m))
        .collect()
}

fn error_to_string(error: Option<&ErrorInfo>, indent: usize) -> String {
    match error {
        Some(e) => messages_to_string(&e.default_messages(), indent),
        None => "None".to_string(),
    }
}

fn upgrade_info_to_string(info: &UpgradeInfo, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let or_none = |v: Option<String>| v.unwrap_or_else(|| "None".to_string());

    format!(
        "{pad}- Upgrading to version: {}\n\
         {pad}- Configured pause point: {}\n\
         {pad}- Switchover scheduled at: {}\n\
         {pad}- Remaining data to replicate to the new machine: {}\n\
         {pad}- Upgrade errors: {}\n",
        or_none(info.upgrade_to.clone()),
        or_none(info.pause.map(|p| p.to_string())),
        or_none(info.start_switchover.map(|t| t.to_rfc3339())),
        or_none(info.remaining_replication_data.map(|d| d.to_string())),
        error_to_string(info.error.as_ref(), indent + 4),
    )
}

fn progress_to_string(progress: Option<&Progress>, indent: usize) -> String {
    let Some(progress) = progress else {
        return "None\n".to_string();
    };
    let pad = " ".repeat(indent);
    format!(
        "{pad}- Total: {}\n{pad}- Completed: {}\n{pad}- Message: {}\n",
        progress.total,
        progress.completed,
        progress
            .message
            .as_ref()
            .map(|m| m.default_message.as_str())
            .unwrap_or("None"),
    )
}

/// Multi-line status report, as logged by the status step.
pub fn status_report(status: &UpgradeStatus) -> String {
    let mut out = format!("\n1. Result: {}", status.status);
    out.push_str(&format!(
        "\n2. Current state: {}",
        status
            .current_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "None".to_string())
    ));
    out.push_str("\n3. Upgrade information:\n");
    out.push_str(&upgrade_info_to_string(&status.upgrade_info, 1));
    out.push_str("\n4. Progress:\n");
    out.push_str(&progress_to_string(status.progress.as_ref(), 1));
    out.push_str("\n5. Notifications:\n");
    out.push_str(&notifications_to_string(status.notifications.as_ref(), 1));

    match status.status {
        OperationStatus::Pending => {
            out.push_str("\nUpgrade has not yet been initialized.");
        }
        OperationStatus::Failed => {
            out.push_str(
                "\n6. Upgrade has failed. You can find the issue which caused the fail in the errors below.\n",
            );
            out.push_str(&format!(
                " - Errors: {}\n",
                messages_to_string(&status.error_messages(), 4)
            ));
        }
        OperationStatus::Canceled => {
            out.push_str(
                "\n6. Upgrade has been canceled. You can find the issue which triggered cancellation in the errors below.\n",
            );
            out.push_str(&format!(
                " - Errors: {}\n",
                messages_to_string(&status.error_messages(), 4)
            ));
        }
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcenter::types::{LocalizableMessage, UpgradeState};

    fn notification(msg: &str, resolution: Option<&str>) -> Notification {
        Notification {
            id: None,
            time: None,
            message: LocalizableMessage::new(msg),
            resolution: resolution.map(LocalizableMessage::new),
        }
    }

    #[test]
    fn test_notifications_to_string_renders_every_entry() {
        let notifications = Notifications {
            errors: vec![
                notification("Disk too small", Some("Grow the disk")),
                notification("DNS unresolved", None),
            ],
            warnings: vec![notification("Old plugin", None)],
            info: vec![],
        };

        let out = notifications_to_string(Some(&notifications), 0);
        assert!(out.contains("Message: Disk too small"));
        assert!(out.contains("Resolution: Grow the disk"));
        assert!(out.contains("Message: DNS unresolved"));
        assert!(out.contains("Resolution: None"));
        assert!(out.contains("Message: Old plugin"));
    }

    #[test]
    fn test_notifications_to_string_missing() {
        assert_eq!(notifications_to_string(None, 2), "No available notifications");
    }

    #[test]
    fn test_messages_to_string_indent() {
        assert_eq!(messages_to_string(&["a", "b"], 2), "\n  - a\n  - b");
        assert_eq!(messages_to_string(&[], 2), "");
    }

    #[test]
    fn test_status_report_failed() {
        let status = UpgradeStatus {
            status: OperationStatus::Failed,
            current_state: Some(UpgradeState::Deployed),
            desired_state: None,
            upgrade_info: UpgradeInfo {
                upgrade_to: Some("9.0.1.0000".to_string()),
                ..Default::default()
            },
            progress: None,
            notifications: None,
            error: Some(ErrorInfo {
                messages: vec![LocalizableMessage::new("Replication broke")],
            }),
        };

        let report = status_report(&status);
        assert!(report.contains("1. Result: FAILED"));
        assert!(report.contains("2. Current state: DEPLOYED"));
        assert!(report.contains("Upgrading to version: 9.0.1.0000"));
        assert!(report.contains("Configured pause point: None"));
        assert!(report.contains("6. Upgrade has failed"));
        assert!(report.contains("- Replication broke"));
    }

    #[test]
    fn test_status_report_pending() {
        let status = UpgradeStatus {
            status: OperationStatus::Pending,
            current_state: None,
            desired_state: None,
            upgrade_info: UpgradeInfo::default(),
            progress: None,
            notifications: None,
            error: None,
        };

        let report = status_report(&status);
        assert!(report.contains("2. Current state: None"));
        assert!(report.contains("Upgrade has not yet been initialized."));
    }
}
