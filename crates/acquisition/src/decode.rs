//! Stream line decoding
//!
//! A `data:update` value is `<ts>,<col0>,<col1>,...` in the order the
//! columns were requested on subscribe. Empty or malformed numeric fields
//! decode to 0 rather than failing the line.

use contracts::TelemetryFrame;

/// Maps requested column names onto `TelemetryFrame` fields
#[derive(Debug, Clone)]
pub struct LineDecoder {
    columns: Vec<String>,
}

impl LineDecoder {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn decode(&self, line: &str) -> TelemetryFrame {
        let mut fields = line.trim_end_matches(['\r', '\n']).split(',');
        let mut frame = TelemetryFrame {
            timestamp: fields
                .next()
                .and_then(|ts| ts.trim().parse().ok())
                .unwrap_or(0),
            ..Default::default()
        };

        for (column, raw) in self.columns.iter().zip(fields) {
            let raw = raw.trim();
            match column.as_str() {
                "speed" => frame.speed = number(raw),
                "odometer" => frame.odometer = number(raw),
                "soc" => frame.soc = number(raw),
                "elevation" => frame.elevation = number(raw),
                "heading" => frame.heading = number(raw),
                "est_heading" => frame.est_heading = number(raw),
                "power" => frame.power = number(raw),
                "range" => frame.range = number(raw),
                "est_range" => frame.est_range = number(raw),
                "est_lat" => frame.position.latitude = number(raw),
                "est_lng" => frame.position.longitude = number(raw),
                "shift_state" => {
                    frame.shift_state = (!raw.is_empty()).then(|| raw.to_string());
                }
                _ => {}
            }
        }

        frame
    }
}

fn number(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}
