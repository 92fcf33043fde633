use crate::arrays::Array2D;
use std::io::{self, Write};

/// Writes the label grid as comma separated values, one image row per line.
pub fn write_csv<W: Write>(writer: &mut W, labels: &Array2D<u32>) -> io::Result<()> {
    for row in 0..labels.height {
        let mut first = true;
        for &label in labels.get_row(row) {
            if first {
                first = false;
                write!(writer, "{label}")?;
            } else {
                write!(writer, ",{label}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
