//! `tc netem` command builder for host traffic shaping.
//!
//! Builds `tc qdisc` commands for one root netem rule per interface.
//! Requires `iproute2` on the host and `CAP_NET_ADMIN`.

use fault_types::NetworkParams;

/// One root netem rule on one interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingRule {
    /// Network interface to apply the rule to.
    pub interface: String,
    /// Fixed delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Jitter in milliseconds (requires delay_ms).
    pub jitter_ms: Option<u64>,
    /// Packet loss percentage (0.0–100.0).
    pub loss_percent: Option<f32>,
}

impl ShapingRule {
    /// Create an empty rule on `iface`.
    pub fn new(iface: &str) -> Self {
        Self {
            interface: iface.into(),
            delay_ms: None,
            jitter_ms: None,
            loss_percent: None,
        }
    }

    /// Build a rule from validated request parameters.
    pub fn from_params(params: &NetworkParams) -> Self {
        Self {
            interface: params.interface.clone(),
            delay_ms: params.delay_ms,
            jitter_ms: params.delay_ms.and(params.jitter_ms),
            loss_percent: params.loss_percent,
        }
    }

    /// Add fixed latency.
    pub fn delay(mut self, ms: u64) -> Self {
        self.delay_ms = Some(ms);
        self
    }

    /// Add jitter (requires delay).
    pub fn jitter(mut self, ms: u64) -> Self {
        self.jitter_ms = Some(ms);
        self
    }

    /// Add packet loss.
    pub fn loss(mut self, percent: f32) -> Self {
        self.loss_percent = Some(percent);
        self
    }

    /// Arguments for `tc qdisc add dev <iface> root netem <params>`.
    pub fn to_tc_add_args(&self) -> Vec<String> {
        let mut args = vec![
            "qdisc".into(),
            "add".into(),
            "dev".into(),
            self.interface.clone(),
            "root".into(),
            "netem".into(),
        ];

        if let Some(delay) = self.delay_ms {
            args.push("delay".into());
            args.push(format!("{}ms", delay));

            if let Some(jitter) = self.jitter_ms {
                args.push(format!("{}ms", jitter));
            }
        }

        if let Some(loss) = self.loss_percent {
            args.push("loss".into());
            args.push(format!("{:.1}%", loss));
        }

        args
    }

    /// Arguments for `tc qdisc del dev <iface> root`.
    pub fn to_tc_del_args(&self) -> Vec<String> {
        del_args(&self.interface)
    }

    /// Full `tc` command string (for logging).
    pub fn to_tc_command(&self) -> String {
        format!("tc {}", self.to_tc_add_args().join(" "))
    }

    /// Start-of-fault message shown to the caller.
    pub fn describe(&self) -> String {
        match (self.delay_ms, self.loss_percent) {
            (_, Some(loss)) => format!(
                "Network: Dropping {}% packets on {}",
                trim_float(loss),
                self.interface
            ),
            (Some(delay), None) => match self.jitter_ms {
                Some(jitter) => format!(
                    "Network: Adding {}ms (+/- {}ms) latency to {}",
                    delay, jitter, self.interface
                ),
                None => format!("Network: Adding {}ms latency to {}", delay, self.interface),
            },
            (None, None) => format!("Network: Installing netem rule on {}", self.interface),
        }
    }
}

/// Arguments removing whatever root qdisc `iface` carries.
pub fn del_args(iface: &str) -> Vec<String> {
    vec![
        "qdisc".into(),
        "del".into(),
        "dev".into(),
        iface.into(),
        "root".into(),
    ]
}

fn trim_float(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_builds_tc_args() {
        let rule = ShapingRule::new("eth0").delay(200);
        assert_eq!(
            rule.to_tc_add_args(),
            vec!["qdisc", "add", "dev", "eth0", "root", "netem", "delay", "200ms"]
        );
    }

    #[test]
    fn latency_with_jitter_builds_tc_args() {
        let rule = ShapingRule::new("eth0").delay(200).jitter(150);
        assert_eq!(
            rule.to_tc_add_args(),
            vec!["qdisc", "add", "dev", "eth0", "root", "netem", "delay", "200ms", "150ms"]
        );
    }

    #[test]
    fn loss_builds_tc_args() {
        let rule = ShapingRule::new("eth0").loss(10.0);
        assert_eq!(
            rule.to_tc_add_args(),
            vec!["qdisc", "add", "dev", "eth0", "root", "netem", "loss", "10.0%"]
        );
    }

    #[test]
    fn del_args_target_root_qdisc() {
        let rule = ShapingRule::new("ens3").loss(1.0);
        assert_eq!(
            rule.to_tc_del_args(),
            vec!["qdisc", "del", "dev", "ens3", "root"]
        );
    }

    #[test]
    fn jitter_without_delay_is_dropped_from_params() {
        let params = NetworkParams {
            interface: "eth1".into(),
            delay_ms: None,
            jitter_ms: Some(30),
            loss_percent: Some(5.0),
        };
        let rule = ShapingRule::from_params(&params);
        assert_eq!(rule.jitter_ms, None);
        assert_eq!(rule.to_tc_command(), "tc qdisc add dev eth1 root netem loss 5.0%");
    }

    #[test]
    fn describe_matches_fault() {
        assert_eq!(
            ShapingRule::new("eth0").loss(10.0).describe(),
            "Network: Dropping 10% packets on eth0"
        );
        assert_eq!(
            ShapingRule::new("eth0").delay(200).describe(),
            "Network: Adding 200ms latency to eth0"
        );
    }
}
