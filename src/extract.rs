//! Embedded CEA-608 extraction over a list of segment files

use captionforge_captions::{
    CaptionChannel, EmbeddedCaptionExtractor, FieldDecoder, FragmentOutcome,
};
use serde::Serialize;

/// One call a field decoder received
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptionEvent {
    Data {
        channel: CaptionChannel,
        time: f64,
        data: [u8; 2],
    },
    Split {
        channel: CaptionChannel,
        time: f64,
    },
    Reset {
        channel: CaptionChannel,
    },
}

/// Field decoder that logs every call instead of decoding
#[derive(Debug)]
pub struct EventLog {
    channel: CaptionChannel,
    events: Vec<CaptionEvent>,
}

impl EventLog {
    pub fn new(channel: CaptionChannel) -> Self {
        Self {
            channel,
            events: Vec::new(),
        }
    }

    /// Hand out the events recorded so far
    pub fn take(&mut self) -> Vec<CaptionEvent> {
        std::mem::take(&mut self.events)
    }
}

impl FieldDecoder for EventLog {
    fn add_data(&mut self, time: f64, data: [u8; 2]) {
        self.events.push(CaptionEvent::Data {
            channel: self.channel,
            time,
            data,
        });
    }

    fn split_at(&mut self, time: f64) {
        self.events.push(CaptionEvent::Split {
            channel: self.channel,
            time,
        });
    }

    fn reset(&mut self) {
        self.events.push(CaptionEvent::Reset {
            channel: self.channel,
        });
    }
}

/// What happened to one media segment
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    Processed {
        sequence_number: u32,
        discontinuity: bool,
        start_time: f64,
        end_time: f64,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
    },
    Skipped {
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u32>,
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub segment: String,
    #[serde(flatten)]
    pub status: SegmentStatus,
    pub events: Vec<CaptionEvent>,
}

/// Feed an init segment and media segments through an embedded extractor.
///
/// A segment that cannot be read is reported as failed and extraction
/// continues with the next one.
pub fn extract_embedded<'a>(
    init: &[u8],
    segments: impl IntoIterator<Item = (String, &'a [u8])>,
    channels: &[CaptionChannel],
) -> anyhow::Result<Vec<SegmentReport>> {
    let mut extractor = EmbeddedCaptionExtractor::new();
    for &channel in channels {
        extractor.attach(channel, EventLog::new(channel));
    }
    extractor.on_init_segment(init)?;

    let mut reports = Vec::new();
    for (segment, data) in segments {
        let status = match extractor.on_media_segment(data) {
            Ok(FragmentOutcome::Processed(processed)) => SegmentStatus::Processed {
                sequence_number: processed.sequence_number,
                discontinuity: processed.discontinuity,
                start_time: processed.start_time,
                end_time: processed.end_time,
                errors: processed
                    .sample_errors
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
            Ok(FragmentOutcome::Skipped {
                sequence_number,
                reason,
            }) => SegmentStatus::Skipped {
                sequence_number,
                reason: reason.to_string(),
            },
            Err(e) => {
                tracing::warn!("{}: {}", segment, e);
                SegmentStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        let mut events = Vec::new();
        for &channel in channels {
            if let Some(log) = extractor.decoder_mut(channel) {
                events.extend(log.take());
            }
        }

        reports.push(SegmentReport {
            segment,
            status,
            events,
        });
    }

    Ok(reports)
}

/// Render reports as plain text lines
pub fn format_reports(reports: &[SegmentReport]) -> String {
    let mut out = String::new();
    for report in reports {
        match &report.status {
            SegmentStatus::Processed {
                sequence_number,
                discontinuity,
                start_time,
                end_time,
                errors,
            } => {
                out.push_str(&format!(
                    "{}: fragment {} [{:.3} - {:.3}]{}\n",
                    report.segment,
                    sequence_number,
                    start_time,
                    end_time,
                    if *discontinuity { " (discontinuity)" } else { "" }
                ));
                for error in errors {
                    out.push_str(&format!("  error: {}\n", error));
                }
            }
            SegmentStatus::Skipped { reason, .. } => {
                out.push_str(&format!("{}: skipped ({})\n", report.segment, reason));
            }
            SegmentStatus::Failed { error } => {
                out.push_str(&format!("{}: failed: {}\n", report.segment, error));
            }
        }

        for event in &report.events {
            let line = match event {
                CaptionEvent::Data {
                    channel,
                    time,
                    data,
                } => format!("  {} {:.3} {:02x}{:02x}", channel, time, data[0], data[1]),
                CaptionEvent::Split { channel, time } => {
                    format!("  {} {:.3} split", channel, time)
                }
                CaptionEvent::Reset { channel } => format!("  {} reset", channel),
            };
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
