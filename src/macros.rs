#![allow(unused_macros)]

/// Helper macro for locking items
///
/// A poisoned lock is recovered instead of propagating the panic of another thread; the
/// data guarded in this crate is always left consistent between statements.
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_arc_rwlock);
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_arc_rwlock);
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Unpacks a [`crate::metadata::import::RawRow`] into the expected variant, or produces a
/// malformed error naming the token.
///
/// ```rust, ignore
///  let raw = expect_row!(import.row(token)?, Field, token);
/// ```
macro_rules! expect_row {
    ($row:expr, $variant:ident, $token:expr) => {
        match $row {
            crate::metadata::import::RawRow::$variant(raw) => raw,
            other => {
                return Err(malformed_error!(
                    "Expected {} row for {}, got {:?}",
                    stringify!($variant),
                    $token,
                    other.table()
                ))
            }
        }
    };
}
