//! Built-in workflow templates seeded into the catalog at startup.

use modules::builtin::{
    PORT_SCANNER, REPORT_GENERATOR, SERVICE_DETECTION, SUBDOMAIN_DISCOVERY, VULNERABILITY_SCANNER,
};

use crate::models::{ConfigOption, Difficulty, StepDefinition, WorkflowTemplate};

fn tags(list: &[&str]) -> std::collections::BTreeSet<String> {
    list.iter().map(|t| (*t).to_owned()).collect()
}

fn subdomain_step(order: u32) -> StepDefinition {
    StepDefinition::new("subdomains", "Subdomain discovery", "reconnaissance", order, SUBDOMAIN_DISCOVERY)
        .with_option(
            ConfigOption::choice("wordlist", "small", &["small", "medium", "large"])
                .described("Size of the prefix wordlist"),
        )
        .with_outputs(&["subdomains"])
}

fn port_scan_step(order: u32) -> StepDefinition {
    StepDefinition::new("ports", "Port scan", "scanning", order, PORT_SCANNER)
        .with_option(ConfigOption::choice("port_range", "top10", &["top10", "top100", "full"]))
        .with_option(
            ConfigOption::integer("timeout_ms", 1000, Some(50), Some(30_000))
                .described("Per-connection timeout"),
        )
        .with_option(ConfigOption::integer("threads", 16, Some(1), Some(256)))
        .with_inputs(&["subdomains"])
        .with_outputs(&["open_ports", "hosts_scanned"])
}

fn service_step(order: u32) -> StepDefinition {
    StepDefinition::new("services", "Service detection", "scanning", order, SERVICE_DETECTION)
        .with_option(ConfigOption::boolean("version_probe", true))
        .with_inputs(&["open_ports"])
        .with_outputs(&["services"])
}

fn vuln_step(order: u32) -> StepDefinition {
    StepDefinition::new("vulns", "Vulnerability scan", "vulnerability", order, VULNERABILITY_SCANNER)
        .with_option(ConfigOption::choice(
            "min_severity",
            "low",
            &["info", "low", "medium", "high", "critical"],
        ))
        .with_inputs(&["services"])
        .with_outputs(&["vulnerabilities", "checks_run"])
}

fn report_step(order: u32) -> StepDefinition {
    StepDefinition::new("report", "Report", "reporting", order, REPORT_GENERATOR)
        .with_option(ConfigOption::choice("format", "json", &["json", "markdown"]))
        .with_inputs(&["subdomains", "open_ports", "services", "vulnerabilities"])
        .with_outputs(&["report"])
}

/// The templates every catalog starts with.
pub fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: "web-recon".into(),
            name: "Web Application Recon".into(),
            description: "Discover subdomains, scan and fingerprint them, check for known issues and report".into(),
            category: "reconnaissance".into(),
            difficulty: Difficulty::Intermediate,
            tags: tags(&["web", "subdomains", "ports", "vulnerabilities"]),
            estimated_duration: Some("15-30 minutes".into()),
            steps: vec![
                subdomain_step(1),
                port_scan_step(2),
                service_step(3),
                vuln_step(4),
                report_step(5),
            ],
        },
        WorkflowTemplate {
            id: "quick-port-scan".into(),
            name: "Quick Port Scan".into(),
            description: "Scan the most common ports of a single host".into(),
            category: "scanning".into(),
            difficulty: Difficulty::Beginner,
            tags: tags(&["ports", "quick"]),
            estimated_duration: Some("2-5 minutes".into()),
            steps: vec![port_scan_step(1), report_step(2)],
        },
        WorkflowTemplate {
            id: "vuln-assessment".into(),
            name: "Vulnerability Assessment".into(),
            description: "Fingerprint exposed services of a host and match them against known weaknesses".into(),
            category: "vulnerability".into(),
            difficulty: Difficulty::Advanced,
            tags: tags(&["vulnerabilities", "services", "ports"]),
            estimated_duration: Some("10-20 minutes".into()),
            steps: vec![
                port_scan_step(1).with_config("port_range", serde_json::json!("top100")),
                service_step(2),
                vuln_step(3),
                report_step(4),
            ],
        },
    ]
}
