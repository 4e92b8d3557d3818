//! CSV export of episode step records and rewards.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::StepRecord;

/// Column header of the per-step summary.
pub const HEADER: &str = "step,reward,done,load_mw,gen_mw,storage_mw,redispatch_mw,\
                          lines_connected,is_ambiguous,is_illegal,is_dispatching_illegal,game_over";

/// Column header of the rewards file.
pub const REWARDS_HEADER: &str = "step,reward,cumulative_reward";

/// Exports step records to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[StepRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(records, io::BufWriter::new(file))
}

/// Writes step records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[StepRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        wtr.write_record(&[
            r.step.to_string(),
            format!("{:.6}", r.reward),
            r.done.to_string(),
            format!("{:.4}", r.load_mw),
            format!("{:.4}", r.gen_mw),
            format!("{:.4}", r.storage_mw),
            format!("{:.4}", r.redispatch_mw),
            r.lines_connected.to_string(),
            r.is_ambiguous.to_string(),
            r.is_illegal.to_string(),
            r.is_dispatching_illegal.to_string(),
            r.game_over.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes one `(step, reward, cumulative)` row per step, steps counted from 1.
/// Rewards are written in their shortest exact form so they read back unchanged.
pub fn write_rewards_csv(rewards: &[f32], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(REWARDS_HEADER.split(','))?;
    let mut total = 0.0_f32;
    for (i, r) in rewards.iter().enumerate() {
        total += r;
        wtr.write_record(&[
            (i + 1).to_string(),
            r.to_string(),
            format!("{total:.6}"),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads back the reward column written by [`write_rewards_csv`].
pub fn read_rewards_csv(reader: impl io::Read) -> Result<Vec<f32>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let mut rewards = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let value = record.get(1).unwrap_or("").trim();
        let reward = value.parse::<f32>().map_err(|e| {
            csv::Error::from(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("reward \"{value}\": {e}"),
            ))
        })?;
        rewards.push(reward);
    }
    Ok(rewards)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(step: usize) -> StepRecord {
        StepRecord {
            step,
            reward: 0.75,
            done: false,
            load_mw: 259.0,
            gen_mw: 262.0,
            storage_mw: 3.0,
            redispatch_mw: 6.0,
            lines_connected: 20,
            is_ambiguous: false,
            is_illegal: step == 2,
            is_dispatching_illegal: false,
            game_over: false,
        }
    }

    #[test]
    fn header_lists_every_column() {
        let mut buf = Vec::new();
        write_csv(&[make_record(1)], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap_or("");
        assert_eq!(first_line.split(',').count(), 12);
        assert!(first_line.starts_with("step,reward,done"));
    }

    #[test]
    fn row_count_matches_step_count() {
        let records: Vec<StepRecord> = (1..=24).map(make_record).collect();
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        // 1 header + 24 data rows
        assert_eq!(output.lines().count(), 25);
    }

    #[test]
    fn deterministic_output() {
        let records: Vec<StepRecord> = (1..6).map(make_record).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_csv(&records, &mut buf1).unwrap();
        write_csv(&records, &mut buf2).unwrap();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn rows_parse_back() {
        let records: Vec<StepRecord> = (1..4).map(make_record).collect();
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            for i in [1, 3, 4, 5, 6] {
                assert!(rec[i].parse::<f32>().is_ok(), "column {i} should parse as f32");
            }
            assert!(rec[9].parse::<bool>().is_ok());
            rows += 1;
        }
        assert_eq!(rows, 3);
    }

    #[test]
    fn rewards_accumulate() {
        let mut buf = Vec::new();
        write_rewards_csv(&[1.0, 0.5, 0.25], &mut buf).unwrap();
        let output = String::from_utf8(buf.clone()).unwrap();
        let last = output.lines().last().unwrap_or("");
        assert_eq!(last, "3,0.25,1.750000");
        assert_eq!(read_rewards_csv(buf.as_slice()).unwrap(), vec![1.0, 0.5, 0.25]);
    }
}
