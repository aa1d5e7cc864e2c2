//! RADAR: static code risk scanning before launch, and runtime quota checks
//! on sampled CPU/memory.
//!
//! The pattern pack is data, not code; tests substitute smaller tables.

use regex::Regex;
use roost_bot::ResourceSample;

#[derive(Debug, Clone)]
pub struct RiskPattern {
    pub pattern: Regex,
    pub score: u32,
    pub reason: &'static str,
}

impl RiskPattern {
    fn new(pattern: &str, score: u32, reason: &'static str) -> Self {
        Self {
            // Patterns are compile-time literals covered by tests.
            pattern: Regex::new(pattern).expect("static risk pattern"),
            score,
            reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadarConfig {
    pub patterns: Vec<RiskPattern>,
    /// Total score at or above which the static verdict is `suspicious`.
    pub threshold: u32,
    pub long_file_lines: usize,
    pub long_file_score: u32,
    pub memory_limit_mb: u64,
    pub cpu_limit_percent: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        // Matched against lower-cased file contents.
        let patterns = vec![
            RiskPattern::new(r"\bmining\b|\bminer\b", 10, "mining keywords"),
            RiskPattern::new(
                r"\b(bitcoin|monero|ethereum|dogecoin|crypto(currency)?)\b",
                10,
                "cryptocurrency keywords",
            ),
            RiskPattern::new(
                r"hashrate|hash\s*rate|stratum|mining\s*pool|nicehash|minergate|xmrig|coinhive|cryptonight",
                10,
                "hashing/pool vocabulary",
            ),
            RiskPattern::new(r"\bgpu\b|\bcuda\b|\bopencl\b", 10, "GPU vocabulary"),
            RiskPattern::new(
                r"\bddos\b|denial\s*of\s*service|\bdos\s+attack\b",
                10,
                "denial-of-service keywords",
            ),
            RiskPattern::new(r"\bflood(er|ing)?\b", 10, "flood keywords"),
            RiskPattern::new(
                r"\bbotnet\b|\bstresser\b|\bbooter\b",
                10,
                "botnet vocabulary",
            ),
            RiskPattern::new(
                r"proxy\s*list|\bproxies\b|\bsocks[45]\b",
                10,
                "proxy vocabulary",
            ),
            RiskPattern::new(
                r"while\s*\(?\s*(true|1)\s*\)?\s*[:{]",
                10,
                "unbounded loop",
            ),
            RiskPattern::new(
                r"os\.fork\s*\(|child_process\.fork|\bfork\s*\(\s*\)",
                10,
                "process forking",
            ),
            RiskPattern::new(
                r"\[\s*0\s*\]\s*\*\s*\d{6,}|bytearray\s*\(\s*\d{7,}|buffer\.alloc\s*\(\s*\d{7,}",
                10,
                "repeated large allocation",
            ),
            RiskPattern::new(
                r"\beval\s*\(|\bexec\s*\(|new\s+function\s*\(",
                15,
                "dynamic eval",
            ),
            RiskPattern::new(
                r"(\\x[0-9a-f]{2}){4,}|(\\u[0-9a-f]{4}){4,}",
                15,
                "escape-sequence obfuscation",
            ),
        ];

        Self {
            patterns,
            threshold: 20,
            long_file_lines: 10_000,
            long_file_score: 5,
            memory_limit_mb: 128,
            cpu_limit_percent: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskReport {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl RiskReport {
    pub fn first_reason(&self) -> &str {
        self.reasons.first().map(String::as_str).unwrap_or("none")
    }
}

impl RadarConfig {
    /// Static mode: scan every uploaded file before the workspace exists.
    pub fn scan_files<'a, I>(&self, files: I) -> RiskReport
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut report = RiskReport::default();

        for (filename, content) in files {
            let lower = content.to_lowercase();
            for p in &self.patterns {
                if p.pattern.is_match(&lower) {
                    report.score += p.score;
                    report.reasons.push(format!("{}: {}", filename, p.reason));
                }
            }
            if lower.lines().count() > self.long_file_lines {
                report.score += self.long_file_score;
                report.reasons.push(format!("{filename}: oversized file"));
            }
        }

        report
    }

    pub fn is_suspicious(&self, report: &RiskReport) -> bool {
        report.score >= self.threshold
    }

    /// Runtime mode: returns the breach description when a sampled
    /// observation exceeds the configured quotas.
    pub fn check_sample(&self, sample: &ResourceSample) -> Option<String> {
        let memory_mb = sample.memory_mb();
        if memory_mb > self.memory_limit_mb {
            return Some(format!(
                "Memory usage exceeded: {}MB > {}MB limit",
                memory_mb, self.memory_limit_mb
            ));
        }

        let cpu = sample.cpu_percent();
        if cpu > self.cpu_limit_percent as f64 {
            return Some(format!(
                "CPU usage exceeded: {:.1}% > {}% limit",
                cpu, self.cpu_limit_percent
            ));
        }

        None
    }
}
