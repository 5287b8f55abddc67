//! Report emission: JUnit-compatible XML plus a human-readable summary.

use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::executor::ScenarioResult;

/// Render the JUnit XML document for a run.
pub fn junit_xml(results: &[ScenarioResult]) -> std::io::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let failures = results.iter().filter(|r| !r.passed && r.error.is_none()).count();
    let errors = results.iter().filter(|r| r.error.is_some()).count();
    let total_time: f64 = results.iter().map(|r| r.duration.as_secs_f64()).sum();

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(std::io::Error::other)?;

    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", "SIL Scenario Verdicts"));
    suite.push_attribute(("tests", results.len().to_string().as_str()));
    suite.push_attribute(("failures", failures.to_string().as_str()));
    suite.push_attribute(("errors", errors.to_string().as_str()));
    suite.push_attribute(("time", format!("{total_time:.3}").as_str()));
    suite.push_attribute((
        "timestamp",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string().as_str(),
    ));
    writer
        .write_event(Event::Start(suite))
        .map_err(std::io::Error::other)?;

    for result in results {
        let mut case = BytesStart::new("testcase");
        case.push_attribute((
            "name",
            format!("{}: {}", result.scenario_id, result.scenario_name).as_str(),
        ));
        case.push_attribute(("classname", "sil.verdicts"));
        case.push_attribute(("time", format!("{:.3}", result.duration.as_secs_f64()).as_str()));
        writer
            .write_event(Event::Start(case))
            .map_err(std::io::Error::other)?;

        if let Some(error) = &result.error {
            let mut node = BytesStart::new("error");
            node.push_attribute(("message", error.as_str()));
            writer
                .write_event(Event::Start(node))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::Text(BytesText::new(error)))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::End(BytesEnd::new("error")))
                .map_err(std::io::Error::other)?;
        } else if !result.passed {
            let failed: Vec<String> = result
                .verdicts
                .iter()
                .filter(|v| !v.passed)
                .map(|v| {
                    format!(
                        "  [{}] expected={}, observed={}{}",
                        v.description,
                        v.expected,
                        v.observed,
                        if v.details.is_empty() {
                            String::new()
                        } else {
                            format!(" ({})", v.details)
                        }
                    )
                })
                .collect();
            let mut node = BytesStart::new("failure");
            node.push_attribute((
                "message",
                format!("scenario {} failed", result.scenario_id).as_str(),
            ));
            writer
                .write_event(Event::Start(node))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::Text(BytesText::new(&failed.join("\n"))))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::End(BytesEnd::new("failure")))
                .map_err(std::io::Error::other)?;
        }

        // Full evidence block for traceability.
        writer
            .write_event(Event::Start(BytesStart::new("system-out")))
            .map_err(std::io::Error::other)?;
        writer
            .write_event(Event::Text(BytesText::new(&evidence_block(result))))
            .map_err(std::io::Error::other)?;
        writer
            .write_event(Event::End(BytesEnd::new("system-out")))
            .map_err(std::io::Error::other)?;

        writer
            .write_event(Event::End(BytesEnd::new("testcase")))
            .map_err(std::io::Error::other)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("testsuite")))
        .map_err(std::io::Error::other)?;

    String::from_utf8(writer.into_inner()).map_err(std::io::Error::other)
}

fn evidence_block(result: &ScenarioResult) -> String {
    let mut lines = vec![
        format!("Scenario: {} ({})", result.scenario_name, result.scenario_id),
        format!("Description: {}", result.description),
        format!("Verifies: {}", result.verifies.join(", ")),
        format!("ASPICE: {}", result.aspice),
        format!("Duration: {:.2}s", result.duration.as_secs_f64()),
        format!("Result: {}", if result.passed { "PASS" } else { "FAIL" }),
        String::new(),
        "Verdicts:".to_string(),
    ];
    for v in &result.verdicts {
        lines.push(format!(
            "  [{}] {}: expected={}, observed={}",
            if v.passed { "PASS" } else { "FAIL" },
            v.description,
            v.expected,
            v.observed
        ));
        if !v.details.is_empty() {
            lines.push(format!("         {}", v.details));
        }
    }
    lines.join("\n")
}

/// Render the human-readable summary.
pub fn summary_text(results: &[ScenarioResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;
    let rate = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut lines = vec![
        "=".repeat(60),
        "  SIL Test Summary".to_string(),
        format!("  Date: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")),
        "=".repeat(60),
        String::new(),
        format!("  Total scenarios:  {total}"),
        format!("  Passed:           {passed}"),
        format!("  Failed:           {failed}"),
        format!("  Pass rate:        {rate:.1}%"),
        String::new(),
        "-".repeat(60),
    ];

    for r in results {
        lines.push(format!(
            "  [{}] {}: {} ({:.1}s)",
            if r.passed { "PASS" } else { "FAIL" },
            r.scenario_id,
            r.scenario_name,
            r.duration.as_secs_f64()
        ));
        if let Some(error) = &r.error {
            lines.push(format!("         ERROR: {error}"));
        }
        for v in &r.verdicts {
            lines.push(format!(
                "    [{}] {}: expected={}, observed={}",
                if v.passed { "PASS" } else { "FAIL" },
                v.description,
                v.expected,
                v.observed
            ));
        }
    }

    let coverage: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| r.verifies.iter().map(String::as_str))
        .collect();
    lines.extend([
        String::new(),
        "-".repeat(60),
        format!(
            "  Requirement coverage: {}",
            coverage.into_iter().collect::<Vec<_>>().join(", ")
        ),
        "=".repeat(60),
    ]);

    lines.join("\n") + "\n"
}

/// Write both report files into `results_dir`.
pub fn write_reports(results: &[ScenarioResult], results_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(results_dir)?;

    let xml = junit_xml(results)?;
    let xml_path = results_dir.join("sil_results.xml");
    std::fs::File::create(&xml_path)?.write_all(xml.as_bytes())?;
    tracing::info!(path = %xml_path.display(), "JUnit XML report written");

    let summary = summary_text(results);
    let summary_path = results_dir.join("sil_summary.txt");
    std::fs::File::create(&summary_path)?.write_all(summary.as_bytes())?;
    tracing::info!(path = %summary_path.display(), "summary written");

    // Also echo the summary to stdout for interactive runs.
    print!("{summary}");
    Ok(())
}
