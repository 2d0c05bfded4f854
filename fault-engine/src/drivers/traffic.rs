//! Host traffic shaping through `tc`.
//!
//! There is no read-back of kernel state: the shaper only knows what it did.
//! Applying always removes the existing root rule first so repeated applies
//! never stack rules.

use super::Ack;
use crate::error::DriverError;
use async_trait::async_trait;
use fault_core::netem::{self, ShapingRule};
use std::path::Path;
use std::sync::Arc;

/// The OS traffic-control facility.
#[async_trait]
pub trait TrafficControl: Send + Sync {
    /// Whether the tool can be invoked at all.
    fn available(&self) -> bool;

    /// Run one `tc` invocation; failure carries the tool's output.
    async fn run(&self, args: &[String]) -> Result<(), DriverError>;
}

/// [`TrafficControl`] that shells out to the `tc` binary (no shell involved).
#[derive(Debug, Clone)]
pub struct TcCommand {
    program: String,
}

impl TcCommand {
    /// Use the given program name or path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for TcCommand {
    fn default() -> Self {
        Self::new("tc")
    }
}

#[async_trait]
impl TrafficControl for TcCommand {
    fn available(&self) -> bool {
        find_executable(&self.program)
    }

    async fn run(&self, args: &[String]) -> Result<(), DriverError> {
        tracing::debug!("{} {}", self.program, args.join(" "));

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| DriverError::spawn(&self.program, e))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(DriverError::Command {
                program: self.program.clone(),
                output: combined.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Look `program` up the way a shell would: as a path, or on `PATH`.
fn find_executable(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Idempotent apply/clear of one root netem rule per interface.
#[derive(Clone)]
pub struct NetworkShaper {
    tc: Arc<dyn TrafficControl>,
}

impl NetworkShaper {
    /// Create a shaper over a traffic-control facility.
    pub fn new(tc: Arc<dyn TrafficControl>) -> Self {
        Self { tc }
    }

    /// Fail early when `tc` cannot be found.
    pub fn ensure_available(&self) -> Result<(), DriverError> {
        if self.tc.available() {
            Ok(())
        } else {
            Err(DriverError::Unavailable("tc command not found".into()))
        }
    }

    /// Replace whatever root rule the interface has with `rule`.
    ///
    /// The reset is unchecked ("no rule present" is not an error); the add is
    /// checked.
    pub async fn apply(&self, rule: &ShapingRule) -> Result<Ack, DriverError> {
        if let Err(e) = self.tc.run(&rule.to_tc_del_args()).await {
            tracing::debug!(interface = %rule.interface, "no previous rule removed: {}", e);
        }

        self.tc.run(&rule.to_tc_add_args()).await?;
        tracing::info!("{}", rule.to_tc_command());

        Ok(Ack {
            summary: rule.describe(),
        })
    }

    /// Remove the root rule from `interface`.
    pub async fn clear(&self, interface: &str) -> Result<Ack, DriverError> {
        self.tc.run(&netem::del_args(interface)).await?;
        tracing::info!(interface, "netem rule removed");

        Ok(Ack {
            summary: format!("Removed netem rule from {interface}"),
        })
    }
}

impl std::fmt::Debug for NetworkShaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkShaper").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockTrafficControl;

    fn shaper() -> (NetworkShaper, MockTrafficControl) {
        let mock = MockTrafficControl::new();
        (NetworkShaper::new(Arc::new(mock.clone())), mock)
    }

    #[tokio::test]
    async fn apply_resets_then_adds() {
        let (shaper, mock) = shaper();
        let rule = ShapingRule::new("eth0").delay(200);

        let ack = shaper.apply(&rule).await.unwrap();

        assert_eq!(ack.summary, "Network: Adding 200ms latency to eth0");
        assert_eq!(
            mock.commands(),
            vec![rule.to_tc_del_args(), rule.to_tc_add_args()]
        );
        assert_eq!(mock.rule_count("eth0"), 1);
    }

    #[tokio::test]
    async fn repeated_apply_never_stacks_rules() {
        let (shaper, mock) = shaper();

        shaper.apply(&ShapingRule::new("eth0").delay(200)).await.unwrap();
        shaper.apply(&ShapingRule::new("eth0").loss(10.0)).await.unwrap();

        assert_eq!(mock.rule_count("eth0"), 1);
        assert_eq!(
            mock.installed("eth0"),
            Some(ShapingRule::new("eth0").loss(10.0).to_tc_add_args())
        );
    }

    #[tokio::test]
    async fn failed_add_is_reported() {
        let (shaper, mock) = shaper();
        mock.fail_next_add("RTNETLINK answers: Operation not permitted");

        let err = shaper
            .apply(&ShapingRule::new("eth0").loss(5.0))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "tc failed: RTNETLINK answers: Operation not permitted"
        );
        assert_eq!(mock.rule_count("eth0"), 0);
    }

    #[tokio::test]
    async fn clear_is_checked() {
        let (shaper, mock) = shaper();
        assert!(shaper.clear("eth0").await.is_err());

        shaper.apply(&ShapingRule::new("eth0").delay(50)).await.unwrap();
        shaper.clear("eth0").await.unwrap();
        assert_eq!(mock.rule_count("eth0"), 0);
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let (shaper, mock) = shaper();
        mock.set_missing(true);
        assert!(matches!(
            shaper.ensure_available(),
            Err(DriverError::Unavailable(msg)) if msg == "tc command not found"
        ));
    }

    #[test]
    fn executable_lookup() {
        assert!(!find_executable("/definitely/not/here/tc"));
        assert!(!find_executable("chaosd-no-such-binary-on-path"));
    }
}
