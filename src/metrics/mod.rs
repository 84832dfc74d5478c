// Metrics module - Prometheus-compatible counters
// Thread-safe via atomics; per-label counters behind a mutex

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters for requests, cache activity and upstream traffic
#[derive(Debug, Default)]
pub struct Metrics {
    request_count: AtomicU64,

    // Status code counters (e.g., 200, 401, 502)
    status_counts: Mutex<BTreeMap<u16, u64>>,

    // Per-upstream-host request counters
    host_counts: Mutex<BTreeMap<String, u64>>,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_write_failures: AtomicU64,
    coalesced_waits: AtomicU64,

    upstream_fetches: AtomicU64,
    upstream_failures: AtomicU64,
    rejected_hosts: AtomicU64,
    rewritten_pages: AtomicU64,

    bytes_sent: AtomicU64,

    // Sum of request durations in microseconds
    duration_us_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_status_count(&self, status_code: u16) {
        if let Ok(mut counts) = self.status_counts.lock() {
            *counts.entry(status_code).or_insert(0) += 1;
        }
    }

    pub fn increment_host_count(&self, host: &str) {
        if let Ok(mut counts) = self.host_counts.lock() {
            *counts.entry(host.to_string()).or_insert(0) += 1;
        }
    }

    pub fn increment_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_write_failure(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coalesced_wait(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_host(&self) {
        self.rejected_hosts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rewritten_page(&self) {
        self.rewritten_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duration(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        self.duration_us_total
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    pub fn cache_write_failures(&self) -> u64 {
        self.cache_write_failures.load(Ordering::Relaxed)
    }

    pub fn rejected_hosts(&self) -> u64 {
        self.rejected_hosts.load(Ordering::Relaxed)
    }

    pub fn coalesced_waits(&self) -> u64 {
        self.coalesced_waits.load(Ordering::Relaxed)
    }

    /// Render all counters in Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        push_counter(
            &mut output,
            "http_requests_total",
            "Total number of HTTP requests received",
            self.request_count.load(Ordering::Relaxed),
        );

        output.push_str("\n# HELP http_requests_by_status_total HTTP responses by status code\n");
        output.push_str("# TYPE http_requests_by_status_total counter\n");
        if let Ok(counts) = self.status_counts.lock() {
            for (status, count) in counts.iter() {
                output.push_str(&format!(
                    "http_requests_by_status_total{{status=\"{}\"}} {}\n",
                    status, count
                ));
            }
        }

        output.push_str("\n# HELP http_requests_by_upstream_total HTTP requests by upstream host\n");
        output.push_str("# TYPE http_requests_by_upstream_total counter\n");
        if let Ok(counts) = self.host_counts.lock() {
            for (host, count) in counts.iter() {
                output.push_str(&format!(
                    "http_requests_by_upstream_total{{host=\"{}\"}} {}\n",
                    host, count
                ));
            }
        }

        output.push('\n');
        push_counter(
            &mut output,
            "cache_hits_total",
            "Requests served from the disk cache",
            self.cache_hits(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "cache_misses_total",
            "Requests that missed the disk cache",
            self.cache_misses(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "cache_write_failures_total",
            "Cache population attempts that failed",
            self.cache_write_failures(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "coalesced_waits_total",
            "Requests that waited on an in-flight fetch for the same key",
            self.coalesced_waits(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "upstream_fetches_total",
            "Requests sent to an upstream origin",
            self.upstream_fetches(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "upstream_failures_total",
            "Upstream fetches that failed at the transport level",
            self.upstream_failures.load(Ordering::Relaxed),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "rejected_hosts_total",
            "Requests refused because the upstream host is not allowed",
            self.rejected_hosts(),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "rewritten_pages_total",
            "HTML pages whose links were rewritten",
            self.rewritten_pages.load(Ordering::Relaxed),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "http_response_bytes_total",
            "Body bytes sent to clients",
            self.bytes_sent.load(Ordering::Relaxed),
        );
        output.push('\n');
        push_counter(
            &mut output,
            "http_request_duration_microseconds_total",
            "Sum of request durations",
            self.duration_us_total.load(Ordering::Relaxed),
        );

        output
    }
}

fn push_counter(output: &mut String, name: &str, help: &str, value: u64) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} counter\n", name));
    output.push_str(&format!("{} {}\n", name, value));
}
