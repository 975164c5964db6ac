//! CPU reference implementations every GPU result is checked against.

use rayon::prelude::*;

use super::reduction::PrefixSummary;

/// Serial left-to-right scan. `max_sum` starts at 0 and only a strictly
/// greater running sum moves it, so ties keep the earliest end index.
pub fn max_prefix_sum(values: &[i32]) -> PrefixSummary {
    let mut max_sum = 0i32;
    let mut sum = 0i32;
    let mut end_index = 0u32;

    for (i, &value) in values.iter().enumerate() {
        sum = sum.wrapping_add(value);
        if sum > max_sum {
            max_sum = sum;
            end_index = i as u32 + 1;
        }
    }

    PrefixSummary { max_sum, end_index }
}

pub fn sum(values: &[u32]) -> u32 {
    values.iter().fold(0u32, |acc, &v| acc.wrapping_add(v))
}

pub fn sum_parallel(values: &[u32]) -> u32 {
    values
        .par_iter()
        .fold(|| 0u32, |acc, &v| acc.wrapping_add(v))
        .reduce(|| 0u32, u32::wrapping_add)
}

/// Transposes a row-major `height x width` matrix into `width x height`.
pub fn transpose(matrix: &[f32], width: usize, height: usize) -> Vec<f32> {
    assert_eq!(matrix.len(), width * height);

    let mut transposed = vec![0.0f32; width * height];
    for j in 0..height {
        for i in 0..width {
            transposed[i * height + j] = matrix[j * width + i];
        }
    }

    transposed
}

/// First `(row, column)` of `matrix` whose transposed copy differs.
pub fn find_transpose_mismatch(
    matrix: &[f32],
    transposed: &[f32],
    width: usize,
    height: usize,
) -> Option<(usize, usize)> {
    for j in 0..height {
        for i in 0..width {
            if matrix[j * width + i] != transposed[i * height + j] {
                return Some((j, i));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_prefix_sum_scenarios() {
        assert_eq!(max_prefix_sum(&[]), PrefixSummary::EMPTY);
        assert_eq!(max_prefix_sum(&[7]), PrefixSummary { max_sum: 7, end_index: 1 });
        assert_eq!(
            max_prefix_sum(&[3, -1, -2, 5, -1]),
            PrefixSummary { max_sum: 5, end_index: 4 }
        );
        assert_eq!(max_prefix_sum(&[0; 8]), PrefixSummary::EMPTY);
        assert_eq!(max_prefix_sum(&[-3, -1, -7]), PrefixSummary::EMPTY);
        assert_eq!(
            max_prefix_sum(&[1, 2, 3]),
            PrefixSummary { max_sum: 6, end_index: 3 }
        );
    }

    #[test]
    fn plateau_keeps_earliest_index() {
        // prefix sums 4, 4, 2, 4
        assert_eq!(
            max_prefix_sum(&[4, 0, -2, 2]),
            PrefixSummary { max_sum: 4, end_index: 1 }
        );
    }

    #[test]
    fn sums_agree_and_wrap() {
        let values: Vec<u32> = (0..10_000).collect();

        assert_eq!(sum(&values), 49_995_000);
        assert_eq!(sum_parallel(&values), 49_995_000);
        assert_eq!(sum(&[u32::MAX, 2]), 1);
        assert_eq!(sum_parallel(&[u32::MAX, 2]), 1);
    }

    #[test]
    fn transpose_of_rectangle() {
        // 2 x 3
        let matrix = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let transposed = transpose(&matrix, 3, 2);

        assert_eq!(transposed, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(find_transpose_mismatch(&matrix, &transposed, 3, 2), None);
        assert_eq!(find_transpose_mismatch(&matrix, &matrix, 3, 2), Some((0, 1)));
    }
}
