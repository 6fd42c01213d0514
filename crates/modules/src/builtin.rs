//! Built-in reconnaissance modules.
//!
//! These are deterministic stand-ins: they derive plausible findings from the
//! target name instead of touching the network. A deployment swaps real
//! scanners in by registering other handlers under the same capability ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ModuleError, ModuleHandler, ModuleRegistry, Record, RunOptions};

pub const SUBDOMAIN_DISCOVERY: &str = "subdomain_discovery";
pub const PORT_SCANNER: &str = "port_scanner";
pub const SERVICE_DETECTION: &str = "service_detection";
pub const VULNERABILITY_SCANNER: &str = "vulnerability_scanner";
pub const REPORT_GENERATOR: &str = "report_generator";

/// Static description of a module, served by the module listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub outputs: &'static [&'static str],
}

/// The informational module catalog. Not consulted by the engine.
pub fn catalog() -> Vec<ModuleInfo> {
    vec![
        ModuleInfo {
            id: SUBDOMAIN_DISCOVERY,
            name: "Subdomain Discovery",
            category: "reconnaissance",
            description: "Enumerates subdomains of the target domain",
            outputs: &["subdomains"],
        },
        ModuleInfo {
            id: PORT_SCANNER,
            name: "Port Scanner",
            category: "scanning",
            description: "Finds open TCP ports on discovered hosts",
            outputs: &["open_ports", "hosts_scanned"],
        },
        ModuleInfo {
            id: SERVICE_DETECTION,
            name: "Service Detection",
            category: "scanning",
            description: "Fingerprints services listening on open ports",
            outputs: &["services"],
        },
        ModuleInfo {
            id: VULNERABILITY_SCANNER,
            name: "Vulnerability Scanner",
            category: "vulnerability",
            description: "Matches detected services against known weaknesses",
            outputs: &["vulnerabilities", "checks_run"],
        },
        ModuleInfo {
            id: REPORT_GENERATOR,
            name: "Report Generator",
            category: "reporting",
            description: "Renders a digest of everything earlier steps produced",
            outputs: &["report"],
        },
    ]
}

/// Install every built-in module into `registry`.
pub fn register_builtin(registry: &mut ModuleRegistry) {
    registry.register(SUBDOMAIN_DISCOVERY, Arc::new(SubdomainDiscovery));
    registry.register(PORT_SCANNER, Arc::new(PortScanner));
    registry.register(SERVICE_DETECTION, Arc::new(ServiceDetection));
    registry.register(VULNERABILITY_SCANNER, Arc::new(VulnerabilityScanner));
    registry.register(REPORT_GENERATOR, Arc::new(ReportGenerator));
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn target_host(inputs: &Record) -> Result<String, ModuleError> {
    match inputs.get("target") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
        Some(Value::Object(obj)) => obj
            .get("host")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ModuleError::InvalidInput("target record has no 'host'".into())),
        _ => Err(ModuleError::InvalidInput("target must be a non-empty string".into())),
    }
}

fn config_str<'a>(config: &'a Record, key: &str, default: &'a str) -> &'a str {
    config.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Small stable hash so stand-in findings vary per host but never per run.
fn host_seed(host: &str) -> u32 {
    host.bytes().fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

fn array_of<'a>(inputs: &'a Record, key: &str) -> &'a [Value] {
    inputs
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Subdomain discovery
// ---------------------------------------------------------------------------

pub struct SubdomainDiscovery;

#[async_trait]
impl ModuleHandler for SubdomainDiscovery {
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        _options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let domain = target_host(inputs)?;
        let prefixes: &[&str] = match config_str(config, "wordlist", "small") {
            "small" => &["www", "api", "mail"],
            "medium" => &["www", "api", "mail", "dev", "staging", "vpn"],
            "large" => &["www", "api", "mail", "dev", "staging", "vpn", "admin", "cdn", "git"],
            other => return Err(ModuleError::InvalidConfig(format!("unknown wordlist '{other}'"))),
        };

        let subdomains: Vec<String> = prefixes.iter().map(|p| format!("{p}.{domain}")).collect();
        debug!(domain = %domain, found = subdomains.len(), "subdomain discovery finished");

        let mut out = Record::new();
        out.insert("subdomains".into(), json!(subdomains));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Port scanner
// ---------------------------------------------------------------------------

pub struct PortScanner;

const CANDIDATE_PORTS: &[u16] = &[22, 25, 80, 443, 3306, 5432, 8080, 8443];

#[async_trait]
impl ModuleHandler for PortScanner {
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        _options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let mut hosts: Vec<String> = array_of(inputs, "subdomains")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        if hosts.is_empty() {
            hosts.push(target_host(inputs)?);
        }

        let candidates: &[u16] = match config_str(config, "port_range", "top10") {
            "top10" => &CANDIDATE_PORTS[..4],
            "top100" | "full" => CANDIDATE_PORTS,
            other => return Err(ModuleError::InvalidConfig(format!("unknown port_range '{other}'"))),
        };

        let mut open_ports = Vec::new();
        for host in &hosts {
            let seed = host_seed(host);
            for (i, port) in candidates.iter().enumerate() {
                // 80 and 443 are always open; the rest depend on the host.
                if *port == 80 || *port == 443 || (seed >> i) & 1 == 1 {
                    open_ports.push(json!({ "host": host, "port": port }));
                }
            }
        }

        let mut out = Record::new();
        out.insert("open_ports".into(), Value::Array(open_ports));
        out.insert("hosts_scanned".into(), json!(hosts.len()));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Service detection
// ---------------------------------------------------------------------------

pub struct ServiceDetection;

fn fingerprint(port: u64) -> (&'static str, &'static str) {
    match port {
        22 => ("ssh", "OpenSSH 8.9"),
        25 => ("smtp", "Postfix 3.6"),
        80 => ("http", "nginx 1.24"),
        443 => ("https", "nginx 1.24"),
        3306 => ("mysql", "MySQL 8.0"),
        5432 => ("postgresql", "PostgreSQL 15"),
        8080 => ("http-proxy", "Jetty 9.4"),
        8443 => ("https-alt", "Tomcat 9.0"),
        _ => ("unknown", ""),
    }
}

#[async_trait]
impl ModuleHandler for ServiceDetection {
    async fn execute(
        &self,
        inputs: &Record,
        _config: &Record,
        _options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let open_ports = inputs
            .get("open_ports")
            .and_then(Value::as_array)
            .ok_or_else(|| ModuleError::InvalidInput("service detection needs 'open_ports'".into()))?;

        let services: Vec<Value> = open_ports
            .iter()
            .filter_map(|entry| {
                let host = entry.get("host")?.as_str()?;
                let port = entry.get("port")?.as_u64()?;
                let (service, version) = fingerprint(port);
                Some(json!({ "host": host, "port": port, "service": service, "version": version }))
            })
            .collect();

        let mut out = Record::new();
        out.insert("services".into(), Value::Array(services));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Vulnerability scanner
// ---------------------------------------------------------------------------

pub struct VulnerabilityScanner;

const SEVERITIES: &[&str] = &["info", "low", "medium", "high", "critical"];

fn severity_rank(severity: &str) -> Option<usize> {
    SEVERITIES.iter().position(|s| *s == severity)
}

/// (service, finding id, title, severity, intrusive)
const KNOWN_ISSUES: &[(&str, &str, &str, &str, bool)] = &[
    ("http", "HTTP-001", "Missing security headers", "low", false),
    ("https", "TLS-002", "TLS 1.0 still accepted", "medium", false),
    ("ssh", "SSH-003", "Password authentication enabled", "medium", false),
    ("mysql", "DB-004", "Database port exposed to the internet", "high", false),
    ("postgresql", "DB-004", "Database port exposed to the internet", "high", false),
    ("mysql", "DB-005", "Default credentials accepted", "critical", true),
    ("http-proxy", "HTTP-006", "Open proxy relays external requests", "high", true),
    ("smtp", "SMTP-007", "Open relay", "high", true),
];

#[async_trait]
impl ModuleHandler for VulnerabilityScanner {
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let min = config_str(config, "min_severity", "low");
        let min_rank = severity_rank(min)
            .ok_or_else(|| ModuleError::InvalidConfig(format!("unknown severity '{min}'")))?;

        let services = array_of(inputs, "services");
        let mut findings = Vec::new();
        let mut checks_run = 0usize;

        for service in services {
            let (Some(host), Some(port), Some(name)) = (
                service.get("host").and_then(Value::as_str),
                service.get("port").and_then(Value::as_u64),
                service.get("service").and_then(Value::as_str),
            ) else {
                continue;
            };

            for (svc, id, title, severity, intrusive) in KNOWN_ISSUES {
                if *svc != name || (*intrusive && options.safe_mode) {
                    continue;
                }
                checks_run += 1;
                if severity_rank(severity).unwrap_or(0) >= min_rank {
                    findings.push(json!({
                        "host": host,
                        "port": port,
                        "id": id,
                        "title": title,
                        "severity": severity,
                    }));
                }
            }
        }

        let mut out = Record::new();
        out.insert("vulnerabilities".into(), Value::Array(findings));
        out.insert("checks_run".into(), json!(checks_run));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Report generator
// ---------------------------------------------------------------------------

pub struct ReportGenerator;

#[async_trait]
impl ModuleHandler for ReportGenerator {
    async fn execute(
        &self,
        inputs: &Record,
        config: &Record,
        _options: &RunOptions,
    ) -> Result<Record, ModuleError> {
        let target = target_host(inputs)?;
        let format = config_str(config, "format", "json");

        let vulnerabilities = array_of(inputs, "vulnerabilities");
        let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
        for v in vulnerabilities {
            if let Some(severity) = v.get("severity").and_then(Value::as_str) {
                *by_severity.entry(severity).or_default() += 1;
            }
        }

        let counts = json!({
            "subdomains": array_of(inputs, "subdomains").len(),
            "open_ports": array_of(inputs, "open_ports").len(),
            "services": array_of(inputs, "services").len(),
            "vulnerabilities": vulnerabilities.len(),
        });

        let body = match format {
            "json" => None,
            "markdown" => {
                let mut md = format!("# Scan report for {target}\n\n");
                for (key, value) in counts.as_object().into_iter().flatten() {
                    md.push_str(&format!("- {key}: {value}\n"));
                }
                for (severity, n) in &by_severity {
                    md.push_str(&format!("- severity {severity}: {n}\n"));
                }
                Some(md)
            }
            other => return Err(ModuleError::InvalidConfig(format!("unknown report format '{other}'"))),
        };

        let mut report = json!({
            "target": target,
            "format": format,
            "counts": counts,
            "bySeverity": by_severity,
        });
        if let (Some(body), Some(obj)) = (body, report.as_object_mut()) {
            obj.insert("body".into(), Value::String(body));
        }

        let mut out = Record::new();
        out.insert("report".into(), report);
        Ok(out)
    }
}
