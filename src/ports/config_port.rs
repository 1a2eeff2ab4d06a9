//! Configuration access port trait.
//!
//! Section and key names are case-insensitive for file-backed adapters.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Section names in sorted order.
    fn sections(&self) -> Vec<String>;

    /// Keys of one section in sorted order; empty if the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
