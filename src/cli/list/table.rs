use std::fmt::{self, Write};

/// Placeholder for an absent value. Keeps rows awk-splittable.
pub(crate) const EMPTY_CELL: &str = "-";

pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        self.cells
            .iter()
            .all(|cell| !cell.is_empty() && !cell.contains(char::is_whitespace))
    }

    fn columns(&self) -> usize {
        self.cells.len()
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        let cells = cells
            .into_iter()
            .map(|cell| {
                if cell.is_empty() {
                    EMPTY_CELL.to_string()
                } else {
                    cell
                }
            })
            .collect();

        Row { cells }
    }
}

impl From<Vec<&str>> for Row {
    fn from(value: Vec<&str>) -> Self {
        let value: Vec<String> = value.into_iter().map(str::to_owned).collect();

        value.into()
    }
}

/// Whitespace-aligned columns, one record per line.
pub(crate) struct Table {
    header: Option<Row>,
    body: Vec<Row>,
    num_columns: Option<usize>,
    print_header: bool,
}

impl Table {
    pub(crate) fn new() -> Table {
        Table {
            header: None,
            body: Vec::new(),
            num_columns: None,
            print_header: true,
        }
    }

    fn expect_num_columns(&mut self, num_columns: usize) {
        match self.num_columns {
            Some(n) => assert_eq!(
                n, num_columns,
                "table has {} columns but a row with {} was inserted",
                n, num_columns
            ),
            None => self.num_columns = Some(num_columns),
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    pub(crate) fn add_row<R: Into<Row>>(&mut self, row: R) {
        let row = row.into();

        self.expect_num_columns(row.columns());

        self.body.push(row);
    }

    pub(crate) fn set_header<R: Into<Row>>(&mut self, header: R) {
        let header = header.into();

        self.expect_num_columns(header.columns());

        assert!(header.is_awk_safe(), "table header contains whitespace");

        self.header = Some(header);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let header = if self.print_header {
            self.header.as_ref()
        } else {
            None
        };

        header.into_iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.num_columns.unwrap_or(0)];

        for row in self.visible_rows() {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        for row in self.visible_rows() {
            let last = row.cells.len().saturating_sub(1);

            for (i, cell) in row.cells.iter().enumerate() {
                if i == last {
                    // no trailing padding
                    f.write_str(cell)?;
                } else {
                    write!(f, "{:<width$}  ", cell, width = widths[i])?;
                }
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}
