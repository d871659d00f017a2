//! Rendering of device snapshots into Prometheus text lines.
//!
//! Lines are emitted in a fixed order: all channels of one metric, then the
//! next metric. Two renders of the same snapshot are byte-identical.

use std::fmt;

use tracing::warn;

use crate::error::Result;
use crate::model::{DeviceSnapshot, SwitchStatus, Target, required};

const SWITCH: &str = "Switch.GetStatus";
const INPUT: &str = "Input.GetStatus";
const SYS: &str = "Sys.GetStatus";
const INFO: &str = "Shelly.GetDeviceInfo";

/// Ordered label pairs of one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels(Vec<(&'static str, String)>);

impl Labels {
    /// No labels at all (process metrics).
    pub fn none() -> Self {
        Self::default()
    }

    /// Device-wide labels: just `ip`.
    pub fn device(target: &Target) -> Self {
        Self(vec![("ip", target.to_string())])
    }

    /// Per-channel labels: `ip` then `id`.
    pub fn channel(target: &Target, id: u8) -> Self {
        Self::device(target).with("id", id.to_string())
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }

        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"{}\"", k, escape_label_value(v))?;
        }
        f.write_str("}")
    }
}

/// Value of one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Fixed-point with an exact number of decimals.
    Fixed { value: f64, decimals: usize },
    Integer(u64),
    /// Rendered as `1` or `0`.
    Flag(bool),
    /// Shortest representation that round-trips.
    Float(f64),
    /// The literal `NaN`.
    NaN,
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricValue::Fixed { value, decimals } if value.is_finite() => {
                write!(f, "{:.*}", decimals, value)
            }
            MetricValue::Fixed { value, .. } | MetricValue::Float(value) => {
                f.write_str(&format_value(value))
            }
            MetricValue::Integer(v) => write!(f, "{}", v),
            MetricValue::Flag(v) => f.write_str(if v { "1" } else { "0" }),
            MetricValue::NaN => f.write_str("NaN"),
        }
    }
}

/// One line of exposition output.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: &'static str,
    pub labels: Labels,
    pub value: MetricValue,
}

impl MetricLine {
    pub fn new(name: &'static str, labels: Labels, value: MetricValue) -> Self {
        Self {
            name,
            labels,
            value,
        }
    }
}

impl fmt::Display for MetricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.name, self.labels, self.value)
    }
}

/// An optional switch field that was absent, so its line was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedField {
    pub channel: u8,
    pub field: &'static str,
}

/// Lines rendered for one device, plus the optional fields it lacked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedDevice {
    pub lines: Vec<MetricLine>,
    pub skipped: Vec<SkippedField>,
}

impl RenderedDevice {
    fn push(&mut self, name: &'static str, labels: Labels, value: MetricValue) {
        self.lines.push(MetricLine::new(name, labels, value));
    }

    /// One line per switch for a field that may be absent.
    fn push_optional(
        &mut self,
        target: &Target,
        switches: &[SwitchStatus],
        name: &'static str,
        field: &'static str,
        decimals: usize,
        get: impl Fn(&SwitchStatus) -> Option<f64>,
    ) {
        for switch in switches {
            match get(switch) {
                Some(value) => self.push(
                    name,
                    Labels::channel(target, switch.id),
                    MetricValue::Fixed { value, decimals },
                ),
                None => {
                    warn!(ip = %target, id = switch.id, field, "Switch status has no {}", field);
                    self.skipped.push(SkippedField {
                        channel: switch.id,
                        field,
                    });
                }
            }
        }
    }
}

/// Render all metrics of one device.
///
/// Fails on the first missing mandatory field; in that case nothing of this
/// device should be written.
pub fn render_device(target: &Target, snapshot: &DeviceSnapshot) -> Result<RenderedDevice> {
    let mut out = RenderedDevice::default();
    let switches = &snapshot.switches;

    for input in &snapshot.inputs {
        let state = required(input.state, INPUT, "state")?;
        out.push(
            "shelly_input",
            Labels::channel(target, input.id),
            MetricValue::Flag(state),
        );
    }

    for switch in switches {
        let output = required(switch.output, SWITCH, "output")?;
        out.push(
            "shelly_output",
            Labels::channel(target, switch.id),
            MetricValue::Flag(output),
        );
    }

    out.push_optional(target, switches, "shelly_active_power_W", "apower", 1, |s| s.apower);
    out.push_optional(target, switches, "shelly_voltage_V", "voltage", 1, |s| s.voltage);
    out.push_optional(target, switches, "shelly_current_A", "current", 3, |s| s.current);

    for switch in switches {
        out.push(
            "shelly_power_factor",
            Labels::channel(target, switch.id),
            power_factor(switch)?,
        );
    }

    // No absent-field guard for energy and temperature, unlike power/voltage/current.
    for switch in switches {
        let total = switch.aenergy.as_ref().and_then(|e| e.total);
        let total = required(total, SWITCH, "aenergy.total")?;
        out.push(
            "shelly_active_energy_total_Wh",
            Labels::channel(target, switch.id),
            MetricValue::Fixed {
                value: total,
                decimals: 3,
            },
        );
    }

    for switch in switches {
        let celsius = switch.temperature.as_ref().and_then(|t| t.celsius);
        let celsius = required(celsius, SWITCH, "temperature.tC")?;
        out.push(
            "shelly_temperature_celsius",
            Labels::channel(target, switch.id),
            MetricValue::Fixed {
                value: celsius,
                decimals: 1,
            },
        );
    }

    for switch in switches {
        let fahrenheit = switch.temperature.as_ref().and_then(|t| t.fahrenheit);
        let fahrenheit = required(fahrenheit, SWITCH, "temperature.tF")?;
        out.push(
            "shelly_temperature_fahrenheit",
            Labels::channel(target, switch.id),
            MetricValue::Fixed {
                value: fahrenheit,
                decimals: 1,
            },
        );
    }

    // A gauge: the device reports the errors active right now.
    for switch in switches {
        out.push(
            "shelly_error_count",
            Labels::channel(target, switch.id),
            MetricValue::Integer(switch.errors.len() as u64),
        );
    }

    for switch in switches {
        let mut seen: Vec<&str> = Vec::with_capacity(switch.errors.len());
        for error in &switch.errors {
            if seen.contains(&error.as_str()) {
                continue;
            }
            seen.push(error.as_str());
            out.push(
                "shelly_errors",
                Labels::channel(target, switch.id).with("error", error.as_str()),
                MetricValue::Flag(true),
            );
        }
    }

    render_sys(&mut out, target, snapshot)?;

    Ok(out)
}

/// `NaN` whenever no current flows; `pf` is only needed otherwise.
fn power_factor(switch: &SwitchStatus) -> Result<MetricValue> {
    let output = required(switch.output, SWITCH, "output")?;
    let current = switch.current.unwrap_or(0.0);

    if !output || current == 0.0 {
        return Ok(MetricValue::NaN);
    }

    let pf = required(switch.pf, SWITCH, "pf")?;
    Ok(MetricValue::Fixed {
        value: pf,
        decimals: 2,
    })
}

/// Device-wide lines from `Sys.GetStatus` and `Shelly.GetDeviceInfo`.
fn render_sys(out: &mut RenderedDevice, target: &Target, snapshot: &DeviceSnapshot) -> Result<()> {
    let sys = &snapshot.sys;
    let mac = required(sys.mac.as_deref(), SYS, "mac")?;

    let counters = [
        ("shelly_uptime_seconds", sys.uptime, "uptime"),
        ("shelly_ram_free_bytes", sys.ram_free, "ram_free"),
        ("shelly_ram_size_bytes", sys.ram_size, "ram_size"),
        ("shelly_fs_free_bytes", sys.fs_free, "fs_free"),
        ("shelly_fs_size_bytes", sys.fs_size, "fs_size"),
    ];
    for (name, value, field) in counters {
        let value = required(value, SYS, field)?;
        out.push(name, Labels::device(target), MetricValue::Integer(value));
    }

    out.push(
        "shelly_info",
        Labels::device(target).with("mac", mac),
        MetricValue::Flag(true),
    );

    let restart_required = required(sys.restart_required, SYS, "restart_required")?;
    out.push(
        "shelly_restart_required",
        Labels::device(target),
        MetricValue::Flag(restart_required),
    );

    let info = &snapshot.info;
    let labels = Labels::device(target)
        .with("mac", mac)
        .with("id", required(info.id.as_deref(), INFO, "id")?)
        .with("model", required(info.model.as_deref(), INFO, "model")?)
        .with("gen", required(info.generation, INFO, "gen")?.to_string())
        .with("fw_id", required(info.fw_id.as_deref(), INFO, "fw_id")?)
        .with("ver", required(info.ver.as_deref(), INFO, "ver")?)
        .with("app", required(info.app.as_deref(), INFO, "app")?)
        .with("profile", required(info.profile.as_deref(), INFO, "profile")?);
    out.push("shelly_dev_info", labels, MetricValue::Flag(true));

    Ok(())
}

/// Write lines in exposition format, one per text line.
pub fn write_lines<'a, W>(
    out: &mut W,
    lines: impl IntoIterator<Item = &'a MetricLine>,
) -> fmt::Result
where
    W: fmt::Write,
{
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::model::{DeviceInfo, EnergyCounter, InputStatus, SysStatus, Temperature};

    fn switch(
        id: u8,
        output: bool,
        apower: f64,
        voltage: f64,
        current: f64,
        pf: f64,
    ) -> SwitchStatus {
        SwitchStatus {
            id,
            output: Some(output),
            apower: Some(apower),
            voltage: Some(voltage),
            current: Some(current),
            pf: Some(pf),
            aenergy: Some(EnergyCounter { total: Some(0.0) }),
            temperature: Some(Temperature {
                celsius: Some(40.2),
                fahrenheit: Some(104.3),
            }),
            errors: Vec::new(),
        }
    }

    fn pro2pm_snapshot() -> DeviceSnapshot {
        let mut first = switch(0, true, 23.4, 222.7, 0.181, -0.59);
        first.aenergy = Some(EnergyCounter { total: Some(1.153) });
        first.temperature = Some(Temperature {
            celsius: Some(29.8),
            fahrenheit: Some(85.7),
        });

        DeviceSnapshot {
            switches: vec![first, switch(1, false, 0.0, 3.8, 0.0, 0.0)],
            inputs: vec![
                InputStatus {
                    id: 0,
                    state: Some(false),
                },
                InputStatus {
                    id: 1,
                    state: Some(true),
                },
            ],
            sys: SysStatus {
                mac: Some("30C6F78B8258".to_string()),
                restart_required: Some(false),
                uptime: Some(15938),
                ram_size: Some(233024),
                ram_free: Some(133100),
                fs_size: Some(524288),
                fs_free: Some(159744),
            },
            info: DeviceInfo {
                id: Some("shellypro2pm-30c6f78b8258".to_string()),
                model: Some("SPSW-202PE16EU".to_string()),
                generation: Some(2),
                fw_id: Some("20230112-154212/0.13.0-beta1-g74cb0dd".to_string()),
                ver: Some("0.13.0-beta1".to_string()),
                app: Some("Pro2PM".to_string()),
                profile: Some("switch".to_string()),
            },
        }
    }

    fn render_text(snapshot: &DeviceSnapshot) -> String {
        let rendered = render_device(&Target::from("10.0.0.10"), snapshot).unwrap();
        let mut text = String::new();
        write_lines(&mut text, &rendered.lines).unwrap();
        text
    }

    fn find<'a>(rendered: &'a RenderedDevice, name: &str, id: &str) -> Option<&'a MetricLine> {
        rendered
            .lines
            .iter()
            .find(|l| l.name == name && l.labels.get("id") == Some(id))
    }

    #[test]
    fn test_render_full_device() {
        let expected = r#"shelly_input{ip="10.0.0.10",id="0"} 0
shelly_input{ip="10.0.0.10",id="1"} 1
shelly_output{ip="10.0.0.10",id="0"} 1
shelly_output{ip="10.0.0.10",id="1"} 0
shelly_active_power_W{ip="10.0.0.10",id="0"} 23.4
shelly_active_power_W{ip="10.0.0.10",id="1"} 0.0
shelly_voltage_V{ip="10.0.0.10",id="0"} 222.7
shelly_voltage_V{ip="10.0.0.10",id="1"} 3.8
shelly_current_A{ip="10.0.0.10",id="0"} 0.181
shelly_current_A{ip="10.0.0.10",id="1"} 0.000
shelly_power_factor{ip="10.0.0.10",id="0"} -0.59
shelly_power_factor{ip="10.0.0.10",id="1"} NaN
shelly_active_energy_total_Wh{ip="10.0.0.10",id="0"} 1.153
shelly_active_energy_total_Wh{ip="10.0.0.10",id="1"} 0.000
shelly_temperature_celsius{ip="10.0.0.10",id="0"} 29.8
shelly_temperature_celsius{ip="10.0.0.10",id="1"} 40.2
shelly_temperature_fahrenheit{ip="10.0.0.10",id="0"} 85.7
shelly_temperature_fahrenheit{ip="10.0.0.10",id="1"} 104.3
shelly_error_count{ip="10.0.0.10",id="0"} 0
shelly_error_count{ip="10.0.0.10",id="1"} 0
shelly_uptime_seconds{ip="10.0.0.10"} 15938
shelly_ram_free_bytes{ip="10.0.0.10"} 133100
shelly_ram_size_bytes{ip="10.0.0.10"} 233024
shelly_fs_free_bytes{ip="10.0.0.10"} 159744
shelly_fs_size_bytes{ip="10.0.0.10"} 524288
shelly_info{ip="10.0.0.10",mac="30C6F78B8258"} 1
shelly_restart_required{ip="10.0.0.10"} 0
shelly_dev_info{ip="10.0.0.10",mac="30C6F78B8258",id="shellypro2pm-30c6f78b8258",model="SPSW-202PE16EU",gen="2",fw_id="20230112-154212/0.13.0-beta1-g74cb0dd",ver="0.13.0-beta1",app="Pro2PM",profile="switch"} 1
"#;

        assert_eq!(render_text(&pro2pm_snapshot()), expected);
    }

    #[test]
    fn test_render_is_deterministic() {
        let snapshot = pro2pm_snapshot();
        assert_eq!(render_text(&snapshot), render_text(&snapshot));
    }

    #[test]
    fn test_every_device_line_starts_with_ip() {
        let rendered = render_device(&Target::from("10.0.0.10"), &pro2pm_snapshot()).unwrap();
        for line in &rendered.lines {
            assert!(
                line.labels.to_string().starts_with("{ip=\"10.0.0.10\""),
                "{}",
                line
            );
        }
    }

    #[test]
    fn test_missing_apower_skips_only_that_line() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].apower = None;

        let rendered = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap();

        assert!(find(&rendered, "shelly_active_power_W", "0").is_none());
        assert!(find(&rendered, "shelly_active_power_W", "1").is_some());
        assert!(find(&rendered, "shelly_voltage_V", "0").is_some());
        assert_eq!(
            rendered.skipped,
            vec![SkippedField {
                channel: 0,
                field: "apower"
            }]
        );
    }

    #[test]
    fn test_missing_voltage_and_current_are_skipped() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[1].voltage = None;
        snapshot.switches[1].current = None;

        let rendered = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap();

        assert!(find(&rendered, "shelly_voltage_V", "1").is_none());
        assert!(find(&rendered, "shelly_current_A", "1").is_none());
        assert_eq!(rendered.skipped.len(), 2);
        assert_eq!(
            find(&rendered, "shelly_power_factor", "1").unwrap().value,
            MetricValue::NaN
        );
    }

    #[test]
    fn test_power_factor_nan_when_output_off() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].output = Some(false);
        snapshot.switches[0].pf = Some(0.97);

        let rendered = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap();

        assert_eq!(
            find(&rendered, "shelly_power_factor", "0")
                .unwrap()
                .to_string(),
            r#"shelly_power_factor{ip="10.0.0.10",id="0"} NaN"#
        );
    }

    #[test]
    fn test_power_factor_nan_when_no_current() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].current = Some(0.0);

        let rendered = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap();

        assert_eq!(
            find(&rendered, "shelly_power_factor", "0").unwrap().value,
            MetricValue::NaN
        );
    }

    #[test]
    fn test_power_factor_requires_pf_when_current_flows() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].pf = None;

        let err = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap_err();
        assert!(matches!(err, DeviceError::MissingField { field: "pf", .. }));
    }

    #[test]
    fn test_error_lines() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].errors = vec![
            "overtemp".to_string(),
            "overpower".to_string(),
            "overtemp".to_string(),
        ];

        let text = render_text(&snapshot);

        assert!(text.contains("shelly_error_count{ip=\"10.0.0.10\",id=\"0\"} 3\n"));
        assert!(text.contains("shelly_error_count{ip=\"10.0.0.10\",id=\"1\"} 0\n"));
        assert!(text.contains("shelly_errors{ip=\"10.0.0.10\",id=\"0\",error=\"overtemp\"} 1\n"));
        assert!(text.contains("shelly_errors{ip=\"10.0.0.10\",id=\"0\",error=\"overpower\"} 1\n"));
        assert_eq!(text.matches("shelly_errors{").count(), 2);
    }

    #[test]
    fn test_missing_energy_is_fatal() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[1].aenergy = None;

        let err = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::MissingField {
                field: "aenergy.total",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_output_is_fatal() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.switches[0].output = None;

        assert!(render_device(&Target::from("10.0.0.10"), &snapshot).is_err());
    }

    #[test]
    fn test_missing_mac_is_fatal() {
        let mut snapshot = pro2pm_snapshot();
        snapshot.sys.mac = None;

        let err = render_device(&Target::from("10.0.0.10"), &snapshot).unwrap_err();
        assert!(err.to_string().contains("mac"));
    }

    #[test]
    fn test_labels_display() {
        assert_eq!(Labels::none().to_string(), "");
        assert_eq!(
            Labels::channel(&Target::from("h:80"), 1).to_string(),
            r#"{ip="h:80",id="1"}"#
        );
        assert_eq!(
            Labels::device(&Target::from("h"))
                .with("v", "a\"b\\c")
                .to_string(),
            r#"{ip="h",v="a\"b\\c"}"#
        );
    }

    #[test]
    fn test_metric_value_display() {
        let fixed = |value, decimals| MetricValue::Fixed { value, decimals }.to_string();

        assert_eq!(fixed(23.44, 1), "23.4");
        assert_eq!(fixed(0.0, 3), "0.000");
        assert_eq!(fixed(-0.594, 2), "-0.59");
        assert_eq!(MetricValue::Integer(42).to_string(), "42");
        assert_eq!(MetricValue::Flag(false).to_string(), "0");
        assert_eq!(MetricValue::Float(0.25).to_string(), "0.25");
        assert_eq!(MetricValue::Float(f64::INFINITY).to_string(), "+Inf");
        assert_eq!(MetricValue::NaN.to_string(), "NaN");
    }
}
