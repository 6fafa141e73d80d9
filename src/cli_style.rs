/*!
 * Tether CLI Style System
 *
 * Themed text and tables for reporting pool, breaker and call outcomes.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use tether_core_resilience::{CircuitState, OutcomeSnapshot, PoolStats};

use crate::config::TetherConfig;
use crate::simulate::SimulationReport;

// ============================================================================
// THEME COLORS
// ============================================================================

pub struct Theme;

impl Theme {
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    /// Header style (bold cyan)
    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }
}

pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Draw a section header with a line
pub fn section_header(title: &str) {
    let line_len = 50 - title.len().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a key-value table for stats
pub fn stats_table(items: &[(&str, String)]) -> Table {
    let mut table = create_minimal_table();

    for (key, value) in items {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value)
                .fg(Color::White)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table
}

fn state_color(state: CircuitState) -> Color {
    match state {
        CircuitState::Closed => Color::Green,
        CircuitState::HalfOpen => Color::Yellow,
        CircuitState::Open => Color::Red,
    }
}

/// Outcome breakdown, one row per outcome kind
pub fn outcome_table(outcomes: &OutcomeSnapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Outcome").add_attribute(Attribute::Bold),
            Cell::new("Calls").add_attribute(Attribute::Bold),
        ]);

    let rows = [
        ("success", outcomes.success, Color::Green),
        ("failed", outcomes.failed, Color::Red),
        ("retries_exhausted", outcomes.retries_exhausted, Color::Red),
        ("circuit_open", outcomes.circuit_open, Color::Yellow),
        ("cancelled", outcomes.cancelled, Color::Yellow),
    ];
    for (label, count, color) in rows {
        let count_cell = if count == 0 {
            Cell::new(count).fg(Color::DarkGrey)
        } else {
            Cell::new(count).fg(color)
        };
        table.add_row(vec![Cell::new(label), count_cell]);
    }

    table
}

/// Pool, breaker and throughput figures for one simulation run
pub fn simulation_table(report: &SimulationReport) -> Table {
    let mut table = stats_table(&[
        ("Endpoint", report.endpoint.clone()),
        ("Calls", report.outcomes.total().to_string()),
        (
            "Success rate",
            format!("{:.1}%", report.outcomes.success_rate()),
        ),
        ("Attempts", report.outcomes.attempts.to_string()),
        ("Calls retried", report.outcomes.retried.to_string()),
        ("Elapsed", format_duration(report.elapsed.as_secs_f64())),
        ("Throughput", format!("{:.0} calls/s", report.throughput())),
    ]);
    add_pool_rows(&mut table, &report.pool);
    table.add_row(vec![
        Cell::new("Opened / closed").fg(Color::Cyan),
        Cell::new(format!(
            "{} / {}",
            report.connections_opened, report.connections_closed
        ))
        .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Breaker").fg(Color::Cyan),
        Cell::new(report.breaker.state)
            .fg(state_color(report.breaker.state))
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Breaker trips").fg(Color::Cyan),
        Cell::new(format!(
            "{} ({} transitions)",
            report.breaker_opened, report.breaker_transitions
        ))
        .add_attribute(Attribute::Bold),
    ]);
    table
}

fn add_pool_rows(table: &mut Table, pool: &PoolStats) {
    let rows = [
        ("Open / max", format!("{} / {}", pool.open, pool.max_open)),
        ("Idle", pool.idle.to_string()),
        ("Created", pool.total_created.to_string()),
        ("Evicted", pool.total_evicted.to_string()),
        ("Waits / timeouts", format!("{} / {}", pool.total_waits, pool.total_timeouts)),
    ];
    for (key, value) in rows {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value).add_attribute(Attribute::Bold),
        ]);
    }
}

/// Effective settings after defaults are applied
pub fn config_table(config: &TetherConfig) -> Table {
    let pool = config.pool_config();
    let breaker = config.breaker_config();
    let retry = config.retry_policy();

    stats_table(&[
        ("Endpoint", config.endpoint.clone()),
        (
            "Pool",
            format!(
                "max_open={} max_idle={} min_idle={}",
                pool.max_open, pool.max_idle, pool.min_idle
            ),
        ),
        (
            "Lifetime / idle time",
            format!(
                "{} / {}",
                format_limit(pool.max_lifetime),
                format_limit(pool.max_idle_time)
            ),
        ),
        (
            "Breaker",
            format!(
                "trip after {} failures, close after {} successes, open {}",
                breaker.failure_threshold,
                breaker.success_threshold,
                format_duration(breaker.open_timeout.as_secs_f64())
            ),
        ),
        (
            "Retry",
            format!(
                "{} attempts, {} → {} x{}{}",
                retry.attempts(),
                format_duration(retry.initial_delay.as_secs_f64()),
                format_duration(retry.max_delay.as_secs_f64()),
                retry.multiplier,
                if retry.jitter { " with jitter" } else { "" }
            ),
        ),
    ])
}

fn format_limit(limit: Option<std::time::Duration>) -> String {
    match limit {
        Some(d) => format_duration(d.as_secs_f64()),
        None => "unlimited".to_string(),
    }
}

/// Format duration into human-readable string
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, mins)
    }
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
    eprintln!();
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.1), "100ms");
        assert_eq!(format_duration(1.0), "1.0s");
        assert_eq!(format_duration(60.0), "1m 0s");
        assert_eq!(format_duration(3665.0), "1h 1m");
    }

    #[test]
    fn test_outcome_table_has_row_per_outcome() {
        let snapshot = OutcomeSnapshot {
            success: 8,
            circuit_open: 2,
            ..Default::default()
        };
        let rendered = outcome_table(&snapshot).to_string();
        for label in [
            "success",
            "failed",
            "retries_exhausted",
            "circuit_open",
            "cancelled",
        ] {
            assert!(rendered.contains(label), "missing {label}");
        }
    }

    #[test]
    fn test_config_table_mentions_unlimited_limits() {
        let mut config = TetherConfig::default();
        config.pool.connection_max_lifetime_ms = 0;
        let rendered = config_table(&config).to_string();
        assert!(rendered.contains("unlimited"));
        assert!(rendered.contains("default"));
    }
}
