// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MS-DOS date/time pairs as stored in zip entry headers. Two-second
//! resolution, no timezone, nothing representable before 1980.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Converts a timestamp to the `(date, time)` header fields. Times before
/// 1980 clamp to the DOS epoch, 1980-01-01 00:00:00.
pub fn to_dos(timestamp: &DateTime<Utc>) -> (u16, u16) {
    let year = timestamp.year();
    if year < 1980 {
        let dtime: u32 = (1 << 21) | (1 << 16);
        return ((dtime >> 16) as u16, (dtime & 0xFFFF) as u16);
    }
    let dtime: u32 = ((year as u32 - 1980) << 25)
        | (timestamp.month() << 21)
        | (timestamp.day() << 16)
        | (timestamp.hour() << 11)
        | (timestamp.minute() << 5)
        | (timestamp.second() >> 1);
    ((dtime >> 16) as u16, (dtime & 0xFFFF) as u16)
}

/// Decodes the `(date, time)` header fields. Returns `None` when the fields
/// don't form a real calendar date, which zip headers are free to contain.
pub fn from_dos(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = ((date >> 9) & 0x7f) as i32 + 1980;
    let month = ((date >> 5) & 0x0f) as u32;
    let day = (date & 0x1f) as u32;
    let hour = ((time >> 11) & 0x1f) as u32;
    let minute = ((time >> 5) & 0x3f) as u32;
    let second = ((time << 1) & 0x3e) as u32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
