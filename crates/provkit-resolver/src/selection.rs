use std::collections::BTreeSet;

/// 1-based menu indices chosen by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    indices: BTreeSet<usize>,
}

impl Selection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all(count: usize) -> Self {
        Self {
            indices: (1..=count).collect(),
        }
    }

    /// Grammar: `1,3-4` style indices and inclusive ranges, `a`/`all`, or
    /// `q`/empty to cancel. Out-of-range and unparseable parts are skipped.
    pub fn parse(input: &str, count: usize) -> Self {
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "q" | "quit" | "cancel" => return Self::none(),
            "a" | "all" => return Self::all(count),
            _ => {}
        }

        let mut indices = BTreeSet::new();
        for part in normalized.split(',').map(str::trim) {
            if let Some((start, end)) = part.split_once('-') {
                let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
                else {
                    continue;
                };
                if start > end {
                    continue;
                }
                indices.extend(start.max(1)..=end.min(count));
            } else if let Ok(index) = part.parse::<usize>() {
                if (1..=count).contains(&index) {
                    indices.insert(index);
                }
            }
        }

        Self { indices }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}
