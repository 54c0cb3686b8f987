use crate::errors::CartError;
use std::fmt;

/// Contiguous Column Major Matrix data container.
///
/// Holds a dense matrix of feature values in a single borrowed slice,
/// column after column. This is the layout the tree builder reads from
/// when it sorts the rows of a node by one feature.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Indices into the data row-wise.
    pub index: Vec<usize>,
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    stride1: usize,
    stride2: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new column major Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
            stride1: rows,
            stride2: 1,
        }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.item_index(i, j)]
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        let mut idx = self.stride2 * i;
        idx += j * self.stride1;
        idx
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows)
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        let i = self.item_index(0, col);
        let j = self.item_index(self.rows, col);
        &self.data[i..j]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }
}

/// Flatten row oriented records into the column major layout `Matrix` expects.
///
/// Returns the flat buffer with the number of rows and columns. Every row
/// must have the arity of the first row.
pub fn flatten_rows(rows: &[Vec<f64>]) -> Result<(Vec<f64>, usize, usize), CartError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, |r| r.len());
    if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(CartError::RaggedRow {
            row,
            expected: n_cols,
            found: r.len(),
        });
    }
    let mut data = Vec::with_capacity(n_rows * n_cols);
    for j in 0..n_cols {
        data.extend(rows.iter().map(|r| r[j]));
    }
    Ok((data, n_rows, n_cols))
}

impl<'a, T> fmt::Display for Matrix<'a, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut val = String::new();
        for i in 0..self.rows {
            for j in 0..self.cols {
                val.push_str(self.get(i, j).to_string().as_str());
                if j == (self.cols - 1) {
                    val.push('\n');
                } else {
                    val.push(' ');
                }
            }
        }
        write!(f, "{}", val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_get() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 2, 3);
        println!("{}", m);
        assert_eq!(m.get(0, 0), &1);
        assert_eq!(m.get(1, 0), &2);
        assert_eq!(m.get(1, 2), &7);
    }

    #[test]
    fn test_matrix_get_col() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_col(0), &vec![1, 2, 3]);
        assert_eq!(m.get_col(1), &vec![5, 6, 7]);
    }

    #[test]
    fn test_matrix_row() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_row(2), vec![3, 7]);
        assert_eq!(m.get_row(0), vec![1, 5]);
        assert_eq!(m.get_row(1), vec![2, 6]);
    }

    #[test]
    fn test_flatten_rows() {
        let rows = vec![vec![1., 5.], vec![2., 6.], vec![3., 7.]];
        let (data, n_rows, n_cols) = flatten_rows(&rows).unwrap();
        assert_eq!((n_rows, n_cols), (3, 2));
        let m = Matrix::new(&data, n_rows, n_cols);
        assert_eq!(m.get_row(1), rows[1]);
        assert_eq!(m.get_col(1), &[5., 6., 7.]);
    }

    #[test]
    fn test_flatten_rows_empty() {
        let (data, n_rows, n_cols) = flatten_rows(&[]).unwrap();
        assert!(data.is_empty());
        assert_eq!((n_rows, n_cols), (0, 0));
    }

    #[test]
    fn test_flatten_rows_ragged() {
        let longer = vec![vec![1.], vec![2., 99.]];
        assert_eq!(
            flatten_rows(&longer).unwrap_err(),
            CartError::RaggedRow {
                row: 1,
                expected: 1,
                found: 2
            }
        );
        let shorter = vec![vec![1., 2.], vec![3., 4.], vec![3.]];
        assert_eq!(
            flatten_rows(&shorter).unwrap_err(),
            CartError::RaggedRow {
                row: 2,
                expected: 2,
                found: 1
            }
        );
    }
}
