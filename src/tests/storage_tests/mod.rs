// Storage Tests Module - Testing the storage module
// Tests organized by storage module functionality:
// - message_tests: MessageRecord wire format, attachments, delivery state
// - store_tests: MemoryStore and SqliteStore backends (quota, prefix scan, persistence)
// - cache_tests: ConversationCache expiry, append, namespacing, quota eviction
// - settings_tests: Settings defaults and persistence

mod cache_tests;
mod store_tests;
