// src/geo/layout.rs

/// One column of the 2010 SF1 geographic header record.
///
/// `start` is 1-indexed, as printed in the Census data dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoField {
    pub name: &'static str,
    pub start: usize,
    pub len: usize,
}

impl GeoField {
    const fn new(name: &'static str, start: usize, len: usize) -> Self {
        Self { name, start, len }
    }

    /// Zero-based byte range of this field within a record.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start - 1..self.start - 1 + self.len
    }

    /// One past the last byte this field occupies (1-indexed end).
    pub const fn end(&self) -> usize {
        self.start - 1 + self.len
    }
}

/// Width every header record must have.
pub const RECORD_WIDTH: usize = 500;

pub const SUMLEV: &str = "SUMLEV";
pub const LOGRECNO: &str = "LOGRECNO";
pub const ZCTA5: &str = "ZCTA5";

/// Field layout of the SF1 geographic header (`xxgeo2010.sf1`), in record order.
pub static GEO_FIELDS: &[GeoField] = &[
    GeoField::new("FILEID", 1, 6),
    GeoField::new("STUSAB", 7, 2),
    GeoField::new("SUMLEV", 9, 3),
    GeoField::new("GEOCOMP", 12, 2),
    GeoField::new("CHARITER", 14, 3),
    GeoField::new("CIFSN", 17, 2),
    GeoField::new("LOGRECNO", 19, 7),
    GeoField::new("REGION", 26, 1),
    GeoField::new("DIVISION", 27, 1),
    GeoField::new("STATE", 28, 2),
    GeoField::new("COUNTY", 30, 3),
    GeoField::new("COUNTYCC", 33, 2),
    GeoField::new("COUNTYSC", 35, 2),
    GeoField::new("COUSUB", 37, 5),
    GeoField::new("COUSUBCC", 42, 2),
    GeoField::new("COUSUBSC", 44, 2),
    GeoField::new("PLACE", 46, 5),
    GeoField::new("PLACECC", 51, 2),
    GeoField::new("PLACESC", 53, 2),
    GeoField::new("TRACT", 55, 6),
    GeoField::new("BLKGRP", 61, 1),
    GeoField::new("BLOCK", 62, 4),
    GeoField::new("IUC", 66, 2),
    GeoField::new("CONCIT", 68, 5),
    GeoField::new("CONCITCC", 73, 2),
    GeoField::new("CONCITSC", 75, 2),
    GeoField::new("AIANHH", 77, 4),
    GeoField::new("AIANHHFP", 81, 5),
    GeoField::new("AIANHHCC", 86, 2),
    GeoField::new("AIHHTLI", 88, 1),
    GeoField::new("AITSCE", 89, 3),
    GeoField::new("AITS", 92, 5),
    GeoField::new("AITSCC", 97, 2),
    GeoField::new("TTRACT", 99, 6),
    GeoField::new("TBLKGRP", 105, 1),
    GeoField::new("ANRC", 106, 5),
    GeoField::new("ANRCCC", 111, 2),
    GeoField::new("CBSA", 113, 5),
    GeoField::new("CBSASC", 118, 2),
    GeoField::new("METDIV", 120, 5),
    GeoField::new("CSA", 125, 3),
    GeoField::new("NECTA", 128, 5),
    GeoField::new("NECTASC", 133, 2),
    GeoField::new("NECTADIV", 135, 5),
    GeoField::new("CNECTA", 140, 3),
    GeoField::new("CBSAPCI", 143, 1),
    GeoField::new("NECTAPCI", 144, 1),
    GeoField::new("UA", 145, 5),
    GeoField::new("UASC", 150, 2),
    GeoField::new("UATYPE", 152, 1),
    GeoField::new("UR", 153, 1),
    GeoField::new("CD", 154, 2),
    GeoField::new("SLDU", 156, 3),
    GeoField::new("SLDL", 159, 3),
    GeoField::new("VTD", 162, 6),
    GeoField::new("VTDI", 168, 1),
    GeoField::new("RESERVE2", 169, 3),
    GeoField::new("ZCTA5", 172, 5),
    GeoField::new("SUBMCD", 177, 5),
    GeoField::new("SUBMCDCC", 182, 2),
    GeoField::new("SDELM", 184, 5),
    GeoField::new("SDSEC", 189, 5),
    GeoField::new("SDUNI", 194, 5),
    GeoField::new("AREALAND", 199, 14),
    GeoField::new("AREAWATR", 213, 14),
    GeoField::new("NAME", 227, 90),
    GeoField::new("FUNCSTAT", 317, 1),
    GeoField::new("GCUNI", 318, 1),
    GeoField::new("POP100", 319, 9),
    GeoField::new("HU100", 328, 9),
    GeoField::new("INTPTLAT", 337, 11),
    GeoField::new("INTPTLON", 348, 12),
    GeoField::new("LSADC", 360, 2),
    GeoField::new("PARTFLAG", 362, 1),
    GeoField::new("RESERVE3", 363, 6),
    GeoField::new("UGA", 369, 5),
    GeoField::new("STATENS", 374, 8),
    GeoField::new("COUNTYNS", 382, 8),
    GeoField::new("COUSUBNS", 390, 8),
    GeoField::new("PLACENS", 398, 8),
    GeoField::new("CONCITNS", 406, 8),
    GeoField::new("AIANHHNS", 414, 8),
    GeoField::new("AITSNS", 422, 8),
    GeoField::new("ANRCNS", 430, 8),
    GeoField::new("SUBMCDNS", 438, 8),
    GeoField::new("CD113", 446, 2),
    GeoField::new("CD114", 448, 2),
    GeoField::new("CD115", 450, 2),
    GeoField::new("SLDU2", 452, 3),
    GeoField::new("SLDU3", 455, 3),
    GeoField::new("SLDU4", 458, 3),
    GeoField::new("SLDL2", 461, 3),
    GeoField::new("SLDL3", 464, 3),
    GeoField::new("SLDL4", 467, 3),
    GeoField::new("AIANHHSC", 470, 2),
    GeoField::new("CSASC", 472, 2),
    GeoField::new("CNECTASC", 474, 2),
    GeoField::new("MEMI", 476, 1),
    GeoField::new("NMEMI", 477, 1),
    GeoField::new("PUMA", 478, 5),
    GeoField::new("RESERVED", 483, 18),
];

/// Position of `name` in `GEO_FIELDS`.
pub fn field_index(name: &str) -> Option<usize> {
    GEO_FIELDS.iter().position(|f| f.name == name)
}

/// Look up a field by name.
pub fn field(name: &str) -> Option<&'static GeoField> {
    GEO_FIELDS.iter().find(|f| f.name == name)
}
