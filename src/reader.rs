use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};

use crate::error::{ConvertError, Result};
use crate::types::{HeaderAnomaly, SourceHeader};
use crate::utils::{ascii_field, parse_float_field, parse_int_field};
use crate::MAX_CHANNELS;

/// Length of the fixed preamble
pub const PREAMBLE_LEN: usize = 256;

/// Per-channel field widths, in on-disk order
pub const CHANNEL_FIELDS: [(&str, usize); 9] = [
    ("label", 16),
    ("transducer", 80),
    ("physical_unit", 8),
    ("physical_min", 8),
    ("physical_max", 8),
    ("digital_min", 8),
    ("digital_max", 8),
    ("prefilter", 80),
    ("samples_per_record", 8),
];

const PLACEHOLDER_LABELS: [&str; 7] = ["X", "-", "?", "NA", "N/A", "UNKNOWN", "NONE"];

/// Dependency-free reader for the source recording header
///
/// Only the preamble and the channel field blocks are read; sample data is
/// left on disk. Structural problems (short preamble, bad channel count,
/// truncated channel blocks) are errors, everything else lands in
/// [`SourceHeader::anomalies`].
///
/// # Examples
///
/// ```rust
/// use wineeg::HeaderReader;
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("recording.edf");
/// # wineeg::fixtures::EdfBuilder::standard_montage(10).write(&path).unwrap();
/// let header = HeaderReader::open(&path)?;
///
/// println!("Channels: {}", header.channel_count);
/// println!("Duration: {:.1} s", header.duration_s());
/// for anomaly in &header.anomalies {
///     println!("warning: {}", anomaly);
/// }
/// # Ok::<(), wineeg::ConvertError>(())
/// ```
pub struct HeaderReader;

impl HeaderReader {
    /// Opens `path` and parses its header
    ///
    /// # Errors
    ///
    /// * `ConvertError::FileNotFound` - the file cannot be opened
    /// * `ConvertError::TruncatedHeader` - fewer than 256 bytes
    /// * `ConvertError::InvalidChannelCount` - channel count outside `1..=512`
    /// * `ConvertError::TruncatedChannelFields` - a channel field block is cut short
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SourceHeader> {
        let file = File::open(&path)
            .map_err(|e| ConvertError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;

        let mut header = Self::read_from(BufReader::new(file))?;
        header.path = Some(path.as_ref().to_path_buf());
        Ok(header)
    }

    /// Parses a header from any byte stream positioned at the start of the file.
    pub fn read_from<R: Read>(mut reader: R) -> Result<SourceHeader> {
        let mut preamble = [0u8; PREAMBLE_LEN];
        let found = read_up_to(&mut reader, &mut preamble)?;
        if found < PREAMBLE_LEN {
            return Err(ConvertError::TruncatedHeader { expected: PREAMBLE_LEN, found });
        }

        // 信号数量 (252..256)
        let count_raw = ascii_field(&preamble[252..256]);
        let channel_count = parse_int_field(&count_raw).unwrap_or(0);
        if channel_count <= 0 || channel_count > MAX_CHANNELS as i64 {
            return Err(ConvertError::InvalidChannelCount(channel_count));
        }
        let ns = channel_count as usize;

        let mut anomalies = Vec::new();

        let version = ascii_field(&preamble[0..8]);
        let patient = ascii_field(&preamble[8..88]);
        let recording = ascii_field(&preamble[88..168]);
        let date_raw = ascii_field(&preamble[168..176]);
        let time_raw = ascii_field(&preamble[176..184]);
        let declared_header_bytes = parse_int_field(&ascii_field(&preamble[184..192]));
        let reserved = ascii_field(&preamble[192..236]);

        let records_raw = ascii_field(&preamble[236..244]);
        let record_count = parse_int_field(&records_raw).unwrap_or(-1);
        let duration_raw = ascii_field(&preamble[244..252]);
        let record_duration_s = parse_float_field(&duration_raw).unwrap_or(0.0);

        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(CHANNEL_FIELDS.len());
        for (field, width) in CHANNEL_FIELDS {
            let expected = width * ns;
            let mut block = vec![0u8; expected];
            let found = read_up_to(&mut reader, &mut block)?;
            if found < expected {
                return Err(ConvertError::TruncatedChannelFields { field, expected, found });
            }
            blocks.push(block);
        }

        let labels = split_text(&blocks[0], 16, ns);
        let transducers = split_text(&blocks[1], 80, ns);
        let physical_units = split_text(&blocks[2], 8, ns);
        let physical_min = split_float(&blocks[3], ns, "physical_min", &mut anomalies);
        let physical_max = split_float(&blocks[4], ns, "physical_max", &mut anomalies);
        let digital_min = split_int(&blocks[5], ns, "digital_min", &mut anomalies);
        let digital_max = split_int(&blocks[6], ns, "digital_max", &mut anomalies);
        let prefilters = split_text(&blocks[7], 80, ns);
        let samples_per_record = split_int(&blocks[8], ns, "samples_per_record", &mut anomalies);

        let fs_per_channel = samples_per_record
            .iter()
            .map(|&spr| {
                if record_duration_s > 0.0 {
                    spr as f64 / record_duration_s
                } else {
                    0.0
                }
            })
            .collect();

        let (start_date, start_time) = match parse_datetime(&date_raw, &time_raw) {
            Some((d, t)) => (Some(d), Some(t)),
            None => {
                anomalies.push(HeaderAnomaly::UnreadableStartDateTime {
                    date: date_raw.clone(),
                    time: time_raw.clone(),
                });
                (None, None)
            }
        };

        let mut header = SourceHeader {
            path: None,
            version,
            patient,
            recording,
            start_date,
            start_time,
            declared_header_bytes,
            reserved,
            channel_count: ns,
            record_count,
            record_duration_s,
            labels,
            transducers,
            physical_units,
            physical_min,
            physical_max,
            digital_min,
            digital_max,
            prefilters,
            samples_per_record,
            fs_per_channel,
            anomalies,
        };

        let mut checks = side_checks(&header);
        header.anomalies.append(&mut checks);
        Ok(header)
    }
}

/// Fills as much of `buf` as the stream allows and reports how much was read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn split_text(block: &[u8], width: usize, ns: usize) -> Vec<String> {
    (0..ns)
        .map(|i| ascii_field(&block[i * width..(i + 1) * width]))
        .collect()
}

fn split_float(
    block: &[u8],
    ns: usize,
    field: &'static str,
    anomalies: &mut Vec<HeaderAnomaly>,
) -> Vec<f64> {
    (0..ns)
        .map(|i| {
            let raw = ascii_field(&block[i * 8..(i + 1) * 8]);
            parse_float_field(&raw).unwrap_or_else(|| {
                anomalies.push(HeaderAnomaly::MalformedNumber { field, channel: i, raw });
                f64::NAN
            })
        })
        .collect()
}

fn split_int(
    block: &[u8],
    ns: usize,
    field: &'static str,
    anomalies: &mut Vec<HeaderAnomaly>,
) -> Vec<i64> {
    (0..ns)
        .map(|i| {
            let raw = ascii_field(&block[i * 8..(i + 1) * 8]);
            parse_int_field(&raw).unwrap_or_else(|| {
                anomalies.push(HeaderAnomaly::MalformedNumber { field, channel: i, raw });
                0
            })
        })
        .collect()
}

/// 解析日期 "dd.mm.yy" 和时间 "hh.mm.ss"
fn parse_datetime(date_str: &str, time_str: &str) -> Option<(NaiveDate, NaiveTime)> {
    let date_parts: Vec<&str> = date_str.split('.').collect();
    let time_parts: Vec<&str> = time_str.split('.').collect();
    if date_parts.len() != 3 || time_parts.len() != 3 {
        return None;
    }

    let day = parse_int_field(date_parts[0])?;
    let month = parse_int_field(date_parts[1])?;
    let yy = parse_int_field(date_parts[2])?;
    let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;

    let hour = parse_int_field(time_parts[0])?;
    let minute = parse_int_field(time_parts[1])?;
    let second = parse_int_field(time_parts[2])?;
    let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)?;

    Some((date, time))
}

fn is_placeholder(field: &str) -> bool {
    let tokens: Vec<&str> = field.split_whitespace().collect();
    !tokens.is_empty() && tokens.iter().all(|t| *t == "X" || t.eq_ignore_ascii_case("startdate"))
}

fn is_suspicious_label(label: &str) -> bool {
    label.chars().count() <= 1
        || label.chars().all(|c| c.is_ascii_digit())
        || PLACEHOLDER_LABELS.iter().any(|p| p.eq_ignore_ascii_case(label))
}

/// Non-fatal consistency checks over an already parsed header
fn side_checks(header: &SourceHeader) -> Vec<HeaderAnomaly> {
    let mut out = Vec::new();

    if header.version != "0" {
        out.push(HeaderAnomaly::UnexpectedVersion(header.version.clone()));
    }

    for (field, value) in [("patient", &header.patient), ("recording", &header.recording)] {
        if value.is_empty() {
            out.push(HeaderAnomaly::EmptyField(field));
        } else if is_placeholder(value) {
            out.push(HeaderAnomaly::PlaceholderIdentifier { field, value: value.clone() });
        }
    }

    let expected = header.header_len();
    if header.declared_header_bytes != Some(expected as i64) {
        out.push(HeaderAnomaly::PreambleLengthMismatch {
            declared: header.declared_header_bytes,
            expected,
        });
    }

    if header.record_count <= 0 {
        out.push(HeaderAnomaly::MissingRecordCount(header.record_count));
    }
    if header.record_duration_s <= 0.0 {
        out.push(HeaderAnomaly::InvalidRecordDuration(header.record_duration_s));
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for (channel, label) in header.labels.iter().enumerate() {
        let key = label.to_uppercase();
        if !seen.insert(key.clone()) && reported.insert(key) {
            out.push(HeaderAnomaly::DuplicateLabel(label.clone()));
        }
        if is_suspicious_label(label) {
            out.push(HeaderAnomaly::SuspiciousLabel { channel, label: label.clone() });
        }
    }

    // 注释通道的记录长度与信号通道无关
    let mut distinct: Vec<i64> = Vec::new();
    for channel in header.signal_channels() {
        let spr = header.samples_per_record[channel];
        if !distinct.contains(&spr) {
            distinct.push(spr);
        }
    }
    if distinct.len() > 1 {
        out.push(HeaderAnomaly::InconsistentSamplesPerRecord(distinct));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::EdfBuilder;
    use std::io::Cursor;

    #[test]
    fn test_standard_montage_header() {
        let bytes = EdfBuilder::standard_montage(10).to_bytes();
        let header = HeaderReader::read_from(Cursor::new(bytes)).unwrap();

        assert_eq!(header.channel_count, 19);
        assert_eq!(header.record_count, 10);
        assert_eq!(header.record_duration_s, 1.0);
        assert_eq!(header.labels[0], "Fp1");
        assert_eq!(header.physical_units[0], "uV");
        assert_eq!(header.samples_per_record, vec![250; 19]);
        assert_eq!(header.common_fs(), (250.0, true));
        assert!(header.start_date.is_some());
        assert!(header.anomalies.is_empty(), "{:?}", header.anomalies);
    }

    #[test]
    fn test_edf_plus_annotation_channel() {
        let bytes = EdfBuilder::edf_plus(10).to_bytes();
        let header = HeaderReader::read_from(Cursor::new(bytes)).unwrap();

        assert_eq!(header.channel_count, 20);
        assert_eq!(header.reserved, "EDF+C");
        assert_eq!(header.samples_per_record[19], 60);
        assert_eq!(header.signal_channels().len(), 19);
        assert_eq!(header.common_fs(), (250.0, true));
        assert!(header.anomalies.is_empty(), "{:?}", header.anomalies);
    }

    #[test]
    fn test_short_preamble_is_fatal() {
        let err = HeaderReader::read_from(Cursor::new(vec![b' '; 100])).unwrap_err();
        assert!(matches!(err, ConvertError::TruncatedHeader { expected: 256, found: 100 }));
    }

    #[test]
    fn test_channel_count_range() {
        for bad in ["0   ", "513 ", "abc ", "-4  "] {
            let mut bytes = EdfBuilder::standard_montage(1).to_bytes();
            bytes[252..256].copy_from_slice(bad.as_bytes());
            let err = HeaderReader::read_from(Cursor::new(bytes)).unwrap_err();
            assert!(matches!(err, ConvertError::InvalidChannelCount(_)), "{}", bad);
        }
    }

    #[test]
    fn test_truncated_channel_block_names_field() {
        let bytes = EdfBuilder::standard_montage(1).to_bytes();
        // 256 preamble + full labels + part of the transducer block
        let cut = 256 + 19 * 16 + 40;
        let err = HeaderReader::read_from(Cursor::new(bytes[..cut].to_vec())).unwrap_err();
        match err {
            ConvertError::TruncatedChannelFields { field, expected, found } => {
                assert_eq!(field, "transducer");
                assert_eq!(expected, 19 * 80);
                assert_eq!(found, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_numbers_become_anomalies() {
        let mut builder = EdfBuilder::standard_montage(2);
        builder.raw_physical_min[3] = "bogus".to_string();
        builder.raw_samples_per_record[5] = "2x0".to_string();
        let header = HeaderReader::read_from(Cursor::new(builder.to_bytes())).unwrap();

        assert!(header.physical_min[3].is_nan());
        assert_eq!(header.samples_per_record[5], 0);
        assert!(header.anomalies.contains(&HeaderAnomaly::MalformedNumber {
            field: "physical_min",
            channel: 3,
            raw: "bogus".to_string(),
        }));
        assert!(header
            .anomalies
            .iter()
            .any(|a| matches!(a, HeaderAnomaly::InconsistentSamplesPerRecord(_))));
        let (fs, agree) = header.common_fs();
        assert_eq!(fs, 250.0);
        assert!(!agree);
    }

    #[test]
    fn test_label_and_identity_checks() {
        let mut builder = EdfBuilder::standard_montage(1);
        builder.labels[4] = "Fp1".to_string();
        builder.labels[7] = "X".to_string();
        builder.patient = "X X X X".to_string();
        builder.recording = String::new();
        let header = HeaderReader::read_from(Cursor::new(builder.to_bytes())).unwrap();

        assert!(header.anomalies.contains(&HeaderAnomaly::DuplicateLabel("Fp1".into())));
        assert!(header
            .anomalies
            .contains(&HeaderAnomaly::SuspiciousLabel { channel: 7, label: "X".into() }));
        assert!(header.anomalies.contains(&HeaderAnomaly::EmptyField("recording")));
        assert!(header
            .anomalies
            .iter()
            .any(|a| matches!(a, HeaderAnomaly::PlaceholderIdentifier { field: "patient", .. })));
    }

    #[test]
    fn test_missing_counts_and_length() {
        let mut bytes = EdfBuilder::standard_montage(3).to_bytes();
        bytes[184..192].copy_from_slice(b"999     ");
        bytes[236..244].copy_from_slice(b"        ");
        bytes[244..252].copy_from_slice(b"0       ");
        let header = HeaderReader::read_from(Cursor::new(bytes)).unwrap();

        assert_eq!(header.record_count, -1);
        assert_eq!(header.record_duration_s, 0.0);
        assert_eq!(header.fs_per_channel, vec![0.0; 19]);
        assert!(header.anomalies.contains(&HeaderAnomaly::MissingRecordCount(-1)));
        assert!(header.anomalies.contains(&HeaderAnomaly::InvalidRecordDuration(0.0)));
        assert!(header.anomalies.contains(&HeaderAnomaly::PreambleLengthMismatch {
            declared: Some(999),
            expected: 20 * 256,
        }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = HeaderReader::open("definitely/not/here.edf").unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound(_)));
    }
}
