pub mod time;

use nanoid::nanoid;

/// Generate a 21-character unique id for calls and reservations.
pub fn longid() -> String {
    nanoid!()
}

/// Generate an 8-character short id.
#[allow(unused)]
pub fn shortid() -> String {
    nanoid!(8)
}
