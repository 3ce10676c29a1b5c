use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::protocol::frame::PositionFix;

use super::PositionSource;

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Client for a gpsd endpoint: watches the JSON report stream and folds
/// `SKY` reports (satellite usage, dilution) and `TPV` reports (the actual
/// fix) into complete [PositionFix] values.
///
/// A fix is emitted for a `TPV` report once satellite data has been seen at
/// least once; the latest `SKY` state sticks around across fixes. On any
/// failure the gpsd connection is dropped and re-established on the next
/// call.
pub struct GpsdSource {
    address: String,
    stream: Option<BufReader<TcpStream>>,
    sky: Option<SkyData>,
}

struct SkyData {
    satellites_used: u8,
    hdop: Option<f64>,
}

#[derive(Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "SKY")]
    Sky(SkyReport),
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TpvReport {
    time: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    speed: Option<f64>,
    track: Option<f64>,
    alt: Option<f64>,
}

#[derive(Deserialize)]
struct SkyReport {
    satellites: Option<Vec<Satellite>>,
    hdop: Option<f64>,
}

#[derive(Deserialize)]
struct Satellite {
    #[serde(default)]
    used: bool,
}

impl GpsdSource {
    pub fn new(address: String) -> GpsdSource {
        GpsdSource {
            address,
            stream: None,
            sky: None,
        }
    }

    async fn read_report(&mut self) -> anyhow::Result<Option<PositionFix>> {
        let reader = match self.stream.as_mut() {
            Some(reader) => reader,
            None => bail!("not connected to gpsd"),
        };

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            bail!("gpsd closed the stream");
        }

        match serde_json::from_str::<Report>(line.trim()) {
            Ok(report) => Ok(self.fold_report(report)),
            Err(e) => {
                debug!("unparseable gpsd report - skipping: {}", e);
                Ok(None)
            }
        }
    }

    fn fold_report(&mut self, report: Report) -> Option<PositionFix> {
        match report {
            Report::Sky(sky) => {
                let used = sky.satellites.unwrap_or_default().iter().filter(|s| s.used).count();
                self.sky = Some(SkyData {
                    satellites_used: used.min(u8::MAX as usize) as u8,
                    hdop: sky.hdop,
                });
                None
            }
            Report::Tpv(tpv) => {
                let fix = self.complete_fix(tpv);
                if fix.is_none() {
                    debug!("incomplete fix - waiting for more gpsd data");
                }
                fix
            }
            Report::Other => None,
        }
    }

    fn complete_fix(&self, tpv: TpvReport) -> Option<PositionFix> {
        let sky = self.sky.as_ref()?;
        let timestamp = DateTime::parse_from_rfc3339(&tpv.time?).ok()?;

        Some(PositionFix {
            timestamp: timestamp.timestamp_millis() as f64 / 1000.0,
            latitude: tpv.lat?,
            longitude: tpv.lon?,
            speed: tpv.speed?,
            course: tpv.track?,
            altitude: tpv.alt?,
            satellites_used: sky.satellites_used,
            hdop: sky.hdop?,
        })
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn next_fix(&mut self) -> anyhow::Result<PositionFix> {
        loop {
            if self.stream.is_none() {
                let mut stream = TcpStream::connect(&self.address).await
                    .with_context(|| format!("cannot reach gpsd at {}", self.address))?;
                stream.write_all(WATCH_COMMAND).await?;
                info!("watching gpsd at {}", self.address);
                self.stream = Some(BufReader::new(stream));
            }

            match self.read_report().await {
                Ok(Some(fix)) => return Ok(fix),
                Ok(None) => {}
                Err(e) => {
                    self.stream = None;
                    self.sky = None;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Report {
        serde_json::from_str(line).unwrap()
    }

    const SKY: &str = r#"{"class":"SKY","hdop":1.2,"satellites":[
        {"PRN":1,"used":true},{"PRN":2,"used":true},{"PRN":3,"used":false}]}"#;
    const TPV: &str = r#"{"class":"TPV","mode":3,"time":"2024-05-01T12:00:00.500Z",
        "lat":48.15,"lon":11.58,"speed":4.2,"track":270.0,"alt":519.0}"#;

    #[test]
    fn test_tpv_before_any_sky_is_incomplete() {
        let mut source = GpsdSource::new(String::new());
        assert!(source.fold_report(parse(TPV)).is_none());
    }

    #[test]
    fn test_sky_then_tpv_emits_a_fix() {
        let mut source = GpsdSource::new(String::new());
        assert!(source.fold_report(parse(SKY)).is_none());

        let fix = source.fold_report(parse(TPV)).unwrap();
        assert_eq!(fix.latitude, 48.15);
        assert_eq!(fix.longitude, 11.58);
        assert_eq!(fix.speed, 4.2);
        assert_eq!(fix.course, 270.0);
        assert_eq!(fix.altitude, 519.0);
        assert_eq!(fix.satellites_used, 2);
        assert_eq!(fix.hdop, 1.2);
        assert_eq!(fix.timestamp, 1_714_564_800.5);
    }

    #[test]
    fn test_sky_state_sticks_across_fixes() {
        let mut source = GpsdSource::new(String::new());
        source.fold_report(parse(SKY));

        assert!(source.fold_report(parse(TPV)).is_some());
        assert!(source.fold_report(parse(TPV)).is_some());
    }

    #[test]
    fn test_incomplete_tpv_is_skipped() {
        let mut source = GpsdSource::new(String::new());
        source.fold_report(parse(SKY));

        let truncated = r#"{"class":"TPV","mode":2,"time":"2024-05-01T12:00:00.000Z","lat":48.15,"lon":11.58}"#;
        assert!(source.fold_report(parse(truncated)).is_none());
    }

    #[test]
    fn test_sky_without_hdop_blocks_fixes() {
        let mut source = GpsdSource::new(String::new());
        source.fold_report(parse(r#"{"class":"SKY","satellites":[{"PRN":1,"used":true}]}"#));
        assert!(source.fold_report(parse(TPV)).is_none());
    }

    #[test]
    fn test_unknown_classes_are_ignored() {
        let mut source = GpsdSource::new(String::new());
        let version = r#"{"class":"VERSION","release":"3.25","rev":"3.25"}"#;
        assert!(source.fold_report(parse(version)).is_none());
    }
}
