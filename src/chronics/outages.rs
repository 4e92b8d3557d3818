//! Per-line bookkeeping of maintenance and hazard windows.

/// Steps until the next maintenance starts: 0 while it is ongoing, -1 when
/// no maintenance is left.
pub fn maintenance_time(series: &[bool]) -> Vec<i32> {
    let n = series.len();
    let mut res = vec![-1; n];
    let mut next_start: Option<usize> = None;
    for t in (0..n).rev() {
        if series[t] {
            res[t] = 0;
            if t == 0 || !series[t - 1] {
                next_start = Some(t);
            }
        } else if let Some(start) = next_start {
            res[t] = (start - t) as i32;
        }
    }
    res
}

/// Remaining steps of the ongoing maintenance, or the full length of the
/// upcoming one; 0 when none is left.
pub fn maintenance_duration(series: &[bool]) -> Vec<i32> {
    let n = series.len();
    let mut res = vec![0; n];
    let mut block_end = n;
    let mut next_len = 0;
    for t in (0..n).rev() {
        if series[t] {
            if t + 1 == n || !series[t + 1] {
                block_end = t + 1;
            }
            res[t] = (block_end - t) as i32;
            if t == 0 || !series[t - 1] {
                next_len = (block_end - t) as i32;
            }
        } else {
            res[t] = next_len;
        }
    }
    res
}

/// Remaining steps of the ongoing hazard, 0 otherwise.
pub fn hazard_duration(series: &[bool]) -> Vec<i32> {
    let n = series.len();
    let mut res = vec![0; n];
    let mut block_end = n;
    for t in (0..n).rev() {
        if series[t] {
            if t + 1 == n || !series[t + 1] {
                block_end = t + 1;
            }
            res[t] = (block_end - t) as i32;
        }
    }
    res
}

/// Applies a per-line function to a `[step][line]` matrix.
pub(crate) fn by_line(matrix: &[Vec<bool>], n_line: usize, f: fn(&[bool]) -> Vec<i32>) -> Vec<Vec<i32>> {
    let n_steps = matrix.len();
    let mut out = vec![vec![0; n_line]; n_steps];
    for l in 0..n_line {
        let series: Vec<bool> = matrix.iter().map(|row| row.get(l).copied().unwrap_or(false)).collect();
        for (t, v) in f(&series).into_iter().enumerate() {
            out[t][l] = v;
        }
    }
    out
}
