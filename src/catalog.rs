use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub const MAX_POINTS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown violation category `{0}`")]
    UnknownCategory(String),
    #[error("`{category}` / `{description}` is worth {points} points, above the maximum of 100")]
    PointsOutOfRange {
        category: ViolationCategory,
        description: String,
        points: u32,
    },
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Closed set of violation categories from the school rule book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViolationCategory {
    Kejahatan,
    Kesusilaan,
    Kenakalan,
    Pornografi,
    Bullying,
    Kedisiplinan,
    Kesopanan,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 7] = [
        ViolationCategory::Kejahatan,
        ViolationCategory::Kesusilaan,
        ViolationCategory::Kenakalan,
        ViolationCategory::Pornografi,
        ViolationCategory::Bullying,
        ViolationCategory::Kedisiplinan,
        ViolationCategory::Kesopanan,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ViolationCategory::Kejahatan => "Kejahatan",
            ViolationCategory::Kesusilaan => "Kesusilaan",
            ViolationCategory::Kenakalan => "Kenakalan",
            ViolationCategory::Pornografi => "Pornografi",
            ViolationCategory::Bullying => "Bullying",
            ViolationCategory::Kedisiplinan => "Kedisiplinan",
            ViolationCategory::Kesopanan => "Kesopanan",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ViolationCategory {
    type Err = CatalogError;

    /// Labels match exactly. The rule book's long form of the pornography
    /// category is accepted as an alias.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "Pornografi/Pornoaksi" {
            return Ok(ViolationCategory::Pornografi);
        }
        ViolationCategory::ALL
            .into_iter()
            .find(|category| category.label() == value)
            .ok_or_else(|| CatalogError::UnknownCategory(value.to_string()))
    }
}

const BUILTIN: &[(ViolationCategory, &[(&str, u32)])] = &[
    (
        ViolationCategory::Kejahatan,
        &[("Pembunuhan", 100), ("Perampokan", 100), ("Pemerkosaan", 100)],
    ),
    (
        ViolationCategory::Kesusilaan,
        &[
            ("Perzinaan (hamil/menghamili)", 100),
            ("Homoseksual/Lesbian", 100),
            ("Eksibisionisme/mempertontonkan organ sensitif", 100),
        ],
    ),
    (
        ViolationCategory::Kenakalan,
        &[
            ("Tawuran/perkelahian", 100),
            ("Narkoba/Miras", 100),
            ("Merokok/membawa rokok/vape", 50),
            ("Penggelapan Uang/pencurian Berat (>Rp100.000,-)", 50),
            ("Penggelapan Uang/pencurian Sedang (Rp50.000,- s.d. Rp100.000,-)", 30),
            ("Penggelapan Uang/pencurian Ringan (<Rp50.000,-)", 10),
            ("Pemerasan Berat (menggunakan senjata tajam)", 50),
            ("Pemerasan Sedang (dengan kekerasan fisik)", 30),
            ("Pemerasan Ringan (dengan kata-kata merendahkan)", 10),
            ("Pengancaman Berat (menggunakan senjata tajam)", 50),
            ("Pengancaman Sedang (dengan kekerasan fisik)", 30),
            ("Pengancaman Ringan (dengan kata-kata merendahkan)", 10),
        ],
    ),
    (
        ViolationCategory::Pornografi,
        &[
            ("Menyebarkan video/gambar porno", 50),
            ("Membuat konten berbau pornografi", 50),
            ("Menonton/mengkoleksi konten pornografi", 30),
            ("Menunjukkan gestur/simbol porno", 10),
        ],
    ),
    (
        ViolationCategory::Bullying,
        &[
            ("Fisik", 50),
            ("Verbal", 50),
            ("Non verbal/sosial", 50),
            ("Kekerasan/pelecehan seksual", 50),
            ("Cyberbullying", 50),
        ],
    ),
    (
        ViolationCategory::Kedisiplinan,
        &[
            // waktu
            ("Absen 3 hari berturut-turut (alpa)", 30),
            ("Absen 2 hari berturut-turut (alpa)", 15),
            ("Pulang sebelum waktunya/bolos", 10),
            ("Datang terlambat", 5),
            // barang bawaan
            ("Membawa makeup tidak sesuai ketentuan", 10),
            ("Membawa benda tak ada hubungannya dengan kbm", 10),
            ("Membawa type-X (cair/kertas)", 10),
            ("Tidak membawa bekal makanan/minuman", 10),
            ("Membawa makanan/minuman kemasan plastik", 10),
            ("Lupa tidak menyiapkan geber/beas kaheman", 5),
            // kelas dan lorong
            ("Berduaan dengan lawan jenis/berpacaran", 15),
            ("Berbuat iseng kepada teman", 10),
            ("Merusak/mengotori fasilitas kelas", 10),
            ("Membuang sampah sembarangan (kelas/lorong)", 10),
            ("Mengganggu ketenangan belajar", 10),
            ("Tidak mengikuti arahan guru", 10),
            ("Tidak melakukan tugas piket kebersihan", 10),
            ("Tidak mengerjakan tugas dari guru", 10),
            ("Keluar kelas tanpa izin/keperluan yang jelas", 10),
            ("Bermain bola (di dalam kelas)", 10),
            ("Tidur", 5),
            // luar kelas
            ("Merusak fasilitas sekolah", 10),
            ("Membuang sampah sembarangan (luar kelas)", 10),
            ("Bermain bola pada waktu istirahat kedua", 10),
            ("Keluar lingkungan/gerbang sekolah tanpa izin", 10),
            ("Tidak berjama'ah dzuhur/jum'at di masjid (muslim)", 5),
            ("Tidak sholat dzuhur (muslimah)", 5),
            // pakaian
            ("Menggunakan seragam tidak sesuai ketentuan", 10),
            ("Model seragam tidak sesuai ketentuan", 10),
            ("Atribut tidak lengkap", 10),
            ("Datang/pulang tidak menggunakan sepatu", 10),
            // penampilan
            ("Panjang rambut laki-laki lebih dari 3 cm", 10),
            ("Menggunakan perhiasan/makeup berlebihan", 10),
            ("Memakai kerudung kelihatan rambut/tidak rapi", 10),
            ("Menggunakan aksesoris (laki-laki)", 10),
            ("Kuku panjang (putra/putri)", 10),
        ],
    ),
    (
        ViolationCategory::Kesopanan,
        &[
            ("Tidak memberi salam pada guru", 5),
            ("Menggunakan hp saat guru bicara", 5),
            ("Berbicara kasar/jorok", 5),
        ],
    ),
];

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    categories: BTreeMap<String, BTreeMap<String, u32>>,
}

/// Immutable table of `category -> description -> points`, loaded once at
/// startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<ViolationCategory, BTreeMap<String, u32>>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(category, items)| {
                let descriptions = items
                    .iter()
                    .map(|(description, points)| (description.to_string(), *points))
                    .collect();
                (*category, descriptions)
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(
        entries: BTreeMap<ViolationCategory, BTreeMap<String, u32>>,
    ) -> Result<Self, CatalogError> {
        for (category, descriptions) in &entries {
            for (description, points) in descriptions {
                if *points > MAX_POINTS {
                    return Err(CatalogError::PointsOutOfRange {
                        category: *category,
                        description: description.clone(),
                        points: *points,
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        let mut entries = BTreeMap::new();
        for (label, descriptions) in file.categories {
            let category: ViolationCategory = label.parse()?;
            entries
                .entry(category)
                .or_insert_with(BTreeMap::new)
                .extend(descriptions);
        }
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Configured points for the pair, or 0 when the pair is not listed.
    pub fn points(&self, category: ViolationCategory, description: &str) -> u32 {
        self.entries
            .get(&category)
            .and_then(|descriptions| descriptions.get(description))
            .copied()
            .unwrap_or(0)
    }

    /// Lookup keyed by a free-text category label as stored on a record.
    /// Unrecognised labels score 0 like any other missing pair.
    pub fn points_for_label(&self, category: &str, description: &str) -> u32 {
        category
            .parse::<ViolationCategory>()
            .map(|category| self.points(category, description))
            .unwrap_or(0)
    }

    pub fn contains(&self, category: ViolationCategory, description: &str) -> bool {
        self.entries
            .get(&category)
            .is_some_and(|descriptions| descriptions.contains_key(description))
    }

    pub fn categories(&self) -> impl Iterator<Item = ViolationCategory> + '_ {
        self.entries.keys().copied()
    }

    pub fn descriptions(
        &self,
        category: ViolationCategory,
    ) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.entries
            .get(&category)
            .into_iter()
            .flat_map(|descriptions| descriptions.iter())
            .map(|(description, points)| (description.as_str(), *points))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_pairs_return_configured_points() {
        let catalog = Catalog::builtin();
        for (category, items) in BUILTIN {
            for (description, points) in *items {
                assert_eq!(catalog.points(*category, description), *points);
            }
        }
        assert_eq!(catalog.points(ViolationCategory::Kedisiplinan, "Datang terlambat"), 5);
        assert_eq!(catalog.points(ViolationCategory::Kejahatan, "Pembunuhan"), 100);
    }

    #[test]
    fn missing_pairs_score_zero() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.points(ViolationCategory::Kesopanan, "Datang terlambat"), 0);
        assert_eq!(catalog.points(ViolationCategory::Kedisiplinan, "datang terlambat"), 0);
        assert_eq!(catalog.points_for_label("Lainnya", "Datang terlambat"), 0);
        assert_eq!(catalog.points_for_label("kedisiplinan", "Datang terlambat"), 0);
    }

    #[test]
    fn labels_parse_exactly_with_alias() {
        assert_eq!(
            "Pornografi/Pornoaksi".parse::<ViolationCategory>().unwrap(),
            ViolationCategory::Pornografi
        );
        assert_eq!(
            "Bullying".parse::<ViolationCategory>().unwrap(),
            ViolationCategory::Bullying
        );
        assert!("bullying".parse::<ViolationCategory>().is_err());
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.points_for_label("Pornografi/Pornoaksi", "Menunjukkan gestur/simbol porno"),
            10
        );
    }

    #[test]
    fn toml_override_replaces_builtin_table() {
        let catalog = Catalog::from_toml_str(
            r#"
            [categories.Kedisiplinan]
            "Datang terlambat" = 7
            "Tidur" = 3
            "#,
        )
        .unwrap();
        assert_eq!(catalog.points(ViolationCategory::Kedisiplinan, "Datang terlambat"), 7);
        assert_eq!(catalog.points(ViolationCategory::Kejahatan, "Pembunuhan"), 0);
        assert_eq!(catalog.categories().count(), 1);
    }

    #[test]
    fn toml_rejects_unknown_category_and_excess_points() {
        let unknown = Catalog::from_toml_str("[categories.Lainnya]\n\"x\" = 1\n");
        assert!(matches!(unknown, Err(CatalogError::UnknownCategory(label)) if label == "Lainnya"));

        let excess = Catalog::from_toml_str("[categories.Kesopanan]\n\"x\" = 101\n");
        assert!(matches!(excess, Err(CatalogError::PointsOutOfRange { points: 101, .. })));
    }

    #[test]
    fn every_builtin_category_has_descriptions() {
        let catalog = Catalog::builtin();
        for category in ViolationCategory::ALL {
            assert!(catalog.descriptions(category).count() > 0, "{category} is empty");
        }
        assert!(catalog.contains(ViolationCategory::Bullying, "Cyberbullying"));
    }

    #[test]
    fn example_override_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/catalog.example.toml");
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.points(ViolationCategory::Bullying, "Verbal"), 50);
        assert_eq!(catalog.categories().count(), 3);
        assert!(matches!(
            Catalog::load(Path::new("does/not/exist.toml")),
            Err(CatalogError::Io(_))
        ));
    }
}
