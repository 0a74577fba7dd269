//! Out-of-band fragmented text over a list of segment files

use captionforge_captions::{
    FragmentedTextTrack, SampleTiming, TextCue, TextOutcome, TextParseError, TextParser,
};
use captionforge_media::{TimeRange, Timescale};
use serde::Serialize;

/// Parser that turns each sample's text into a single cue spanning the sample.
///
/// Markup is kept as-is; whitespace-only samples yield no cue.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughParser;

impl TextParser for PassthroughParser {
    fn parse(&mut self, content: &str, timing: SampleTiming) -> Result<Vec<TextCue>, TextParseError> {
        if content.contains('\0') {
            return Err(TextParseError::corrupt("embedded NUL byte"));
        }
        let text = content.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![TextCue::new(timing.start, timing.end(), text)])
    }
}

/// Outcome of one text segment
#[derive(Debug, Clone, Serialize)]
pub struct TextSegmentReport {
    pub segment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u32>,
    pub cues: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextReport {
    pub segments: Vec<TextSegmentReport>,
    pub cues: Vec<TextCue>,
    pub buffered: Vec<TimeRange>,
}

/// Feed an init segment and text fragments through a fragmented text track.
pub fn extract_text<'a>(
    init: &[u8],
    segments: impl IntoIterator<Item = (String, &'a [u8])>,
    start_time: f64,
    default_timescale: Timescale,
) -> anyhow::Result<TextReport> {
    let mut track =
        FragmentedTextTrack::with_timescale(PassthroughParser, Vec::new(), default_timescale);
    track.on_init_segment(init)?;

    let mut reports = Vec::new();
    for (segment, data) in segments {
        let report = match track.on_media_segment(data, start_time) {
            Ok(TextOutcome::Processed(processed)) => TextSegmentReport {
                segment,
                sequence_number: Some(processed.sequence_number),
                cues: processed.cues,
                errors: processed.errors.iter().map(ToString::to_string).collect(),
            },
            Ok(TextOutcome::Skipped {
                sequence_number,
                reason,
            }) => TextSegmentReport {
                segment,
                sequence_number: Some(sequence_number),
                cues: 0,
                errors: vec![format!("skipped: {}", reason)],
            },
            Err(e) => {
                tracing::warn!("{}: {}", segment, e);
                TextSegmentReport {
                    segment,
                    sequence_number: None,
                    cues: 0,
                    errors: vec![e.to_string()],
                }
            }
        };
        reports.push(report);
    }

    let buffered = track.buffered().as_slice().to_vec();
    Ok(TextReport {
        segments: reports,
        cues: track.into_sink(),
        buffered,
    })
}

/// Render a report as plain text lines
pub fn format_text_report(report: &TextReport) -> String {
    let mut out = String::new();
    for segment in &report.segments {
        out.push_str(&format!("{}: {} cues\n", segment.segment, segment.cues));
        for error in &segment.errors {
            out.push_str(&format!("  error: {}\n", error));
        }
    }
    for cue in &report.cues {
        out.push_str(&format!("{:.3} --> {:.3} {}\n", cue.start, cue.end, cue.text));
    }
    let ranges: Vec<String> = report
        .buffered
        .iter()
        .map(|r| format!("[{:.3}, {:.3})", r.start, r.end))
        .collect();
    out.push_str(&format!("buffered: {}\n", ranges.join(" ")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use captionforge_media::fmp4::{FragmentWriter, InitSegmentWriter, SampleSpec};

    #[test]
    fn test_passthrough_parser() {
        let timing = SampleTiming {
            start: 1.0,
            duration: 2.0,
        };
        let cues = PassthroughParser.parse("  <p>hi</p>\n", timing).unwrap();
        assert_eq!(cues, vec![TextCue::new(1.0, 3.0, "<p>hi</p>")]);
        assert!(PassthroughParser.parse(" \n", timing).unwrap().is_empty());
        assert!(PassthroughParser.parse("a\0b", timing).is_err());
    }

    #[test]
    fn test_extract_text_anchors_and_buffers() {
        let init = InitSegmentWriter::new(1000).handler(*b"subt").build();
        let first = FragmentWriter::new(1)
            .base_media_decode_time(60_000)
            .sample(SampleSpec::new(b"one".to_vec(), 2000))
            .build();
        let second = FragmentWriter::new(2)
            .base_media_decode_time(62_000)
            .sample(SampleSpec::new(b"two".to_vec(), 2000))
            .build();

        let report = extract_text(
            &init,
            [
                ("1.m4s".to_string(), first.as_slice()),
                ("2.m4s".to_string(), second.as_slice()),
            ],
            10.0,
            Timescale::MPEG_90K,
        )
        .unwrap();

        assert_eq!(report.cues.len(), 2);
        assert_eq!((report.cues[0].start, report.cues[0].end), (10.0, 12.0));
        assert_eq!((report.cues[1].start, report.cues[1].end), (12.0, 14.0));
        assert_eq!(report.buffered, vec![TimeRange::new(10.0, 14.0)]);

        let text = format_text_report(&report);
        assert!(text.contains("10.000 --> 12.000 one"));
        assert!(text.contains("buffered: [10.000, 14.000)"));
    }
}
