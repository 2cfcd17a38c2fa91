#![forbid(unsafe_code)]

use log::debug;

/// The smallest table class, the table then has two buckets.
const MINIMUM_TABLE_CLASS: u32 = 1;

/// The largest table class that can be addressed on this platform.
const MAXIMUM_TABLE_CLASS: u32 = usize::BITS - 2;

/// Settings of a [crate::TermPool] that are fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermPoolConfig {
    /// The hash table starts with `1 << initial_table_class` buckets.
    pub initial_table_class: u32,

    /// The hash table never grows beyond `1 << maximum_table_class` buckets.
    /// Growth past this point is refused in the same way as a failed
    /// allocation, the chains simply become longer.
    pub maximum_table_class: u32,

    /// The number of words in a single block of the size class allocator.
    pub block_words: usize,
}

impl Default for TermPoolConfig {
    fn default() -> Self {
        Self {
            initial_table_class: 14,
            maximum_table_class: MAXIMUM_TABLE_CLASS,
            block_words: 1 << 13,
        }
    }
}

impl TermPoolConfig {
    /// Sets the initial number of buckets to `1 << class`.
    pub fn with_initial_table_class(mut self, class: u32) -> Self {
        self.initial_table_class = class;
        self
    }

    /// Sets the maximum number of buckets to `1 << class`.
    pub fn with_maximum_table_class(mut self, class: u32) -> Self {
        self.maximum_table_class = class;
        self
    }

    /// Sets the number of words of every allocator block.
    pub fn with_block_words(mut self, words: usize) -> Self {
        self.block_words = words;
        self
    }

    /// Returns a copy where every setting lies within its valid range.
    pub(crate) fn clamped(&self) -> TermPoolConfig {
        let maximum_table_class = self.maximum_table_class.clamp(MINIMUM_TABLE_CLASS, MAXIMUM_TABLE_CLASS);
        let initial_table_class = self.initial_table_class.clamp(MINIMUM_TABLE_CLASS, maximum_table_class);
        let block_words = self.block_words.max(1);

        let result = TermPoolConfig {
            initial_table_class,
            maximum_table_class,
            block_words,
        };

        if result != *self {
            debug!("Term pool configuration {self:?} was clamped to {result:?}");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_clamping() {
        let config = TermPoolConfig::default()
            .with_initial_table_class(20)
            .with_maximum_table_class(4)
            .with_block_words(0)
            .clamped();

        assert_eq!(config.initial_table_class, 4);
        assert_eq!(config.maximum_table_class, 4);
        assert_eq!(config.block_words, 1);

        let config = TermPoolConfig::default();
        assert_eq!(config.clamped(), config, "The defaults should be valid");
    }
}
