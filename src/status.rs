use std::fmt;

/// Disciplinary status derived from a student's accumulated points.
///
/// Variants are ordered by severity so `Ord` doubles as escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Aman,
    Tlg,
    Spw,
    Sp1,
    Sp2,
    Spd,
}

/// Lower bound of each band, checked highest first.
const BANDS: [(u32, Status); 5] = [
    (100, Status::Spd),
    (75, Status::Sp2),
    (50, Status::Sp1),
    (30, Status::Spw),
    (1, Status::Tlg),
];

pub fn classify(points: u32) -> Status {
    for (threshold, status) in BANDS {
        if points >= threshold {
            return status;
        }
    }
    Status::Aman
}

impl Status {
    pub fn code(self) -> &'static str {
        match self {
            Status::Spd => "SPD",
            Status::Sp2 => "SP2",
            Status::Sp1 => "SP1",
            Status::Spw => "SPW",
            Status::Tlg => "TLG",
            Status::Aman => "Aman",
        }
    }

    /// Full label as printed on letters and reports.
    pub fn label(self) -> &'static str {
        match self {
            Status::Spd => "SPD - Surat Pengunduran Diri",
            Status::Sp2 => "SP2 - Surat Peringatan Kedua",
            Status::Sp1 => "SP1 - Surat Peringatan Pertama",
            Status::Spw => "SPW - Surat Panggilan Wali Kelas",
            Status::Tlg => "TLG - Teguran Langsung Guru",
            Status::Aman => "Aman",
        }
    }

    pub fn severity(self) -> Severity {
        severity_for_label(self.label())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Presentation colour for a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Elevated,
    Notice,
    Minor,
    Clear,
}

impl Severity {
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Critical => "bg-red-600 text-white",
            Severity::High => "bg-red-500 text-white",
            Severity::Elevated => "bg-yellow-400 text-black",
            Severity::Notice => "bg-blue-200 text-black",
            Severity::Minor => "bg-gray-200 text-black",
            Severity::Clear => "bg-green-100 text-black",
        }
    }
}

/// Keyed by status-code prefix so stored or exported labels map the same way
/// as live values. Anything unrecognised is shown as clear.
pub fn severity_for_label(label: &str) -> Severity {
    if label.starts_with("SPD") {
        Severity::Critical
    } else if label.starts_with("SP2") {
        Severity::High
    } else if label.starts_with("SP1") {
        Severity::Elevated
    } else if label.starts_with("SPW") {
        Severity::Notice
    } else if label.starts_with("TLG") {
        Severity::Minor
    } else {
        Severity::Clear
    }
}
