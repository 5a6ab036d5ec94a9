// One row of the delimited comment input

/// A single (page, comment) pair read from the input, before filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRecord {
    /// Page reference, may be empty.
    pub page: String,
    /// Comment body as it appeared in the input (untrimmed).
    pub text: String,
}

impl InputRecord {
    pub fn new(page: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            text: text.into(),
        }
    }
}
