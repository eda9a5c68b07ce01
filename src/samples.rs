//! Embedded datasets: chart series that ship with the pages and the fallback rows shown
//! when a CSV cannot be loaded.

use std::collections::BTreeMap;

use crate::models::{MonthlyDataset, VehicleRecord};
use crate::pipeline::monthly_metrics_from_csv;

pub const EMISSIONS_2024: [f64; 12] = [
    968928.5, 1130023.0, 816683.0, 618009.9, 606827.4, 861581.1, 620495.8, 635687.0, 576068.0,
    1310736.6, 1193778.8, 690519.5,
];

pub const EMISSIONS_2025: [f64; 12] = [
    900508.5, 1072075.9, 1392782.9, 1059320.4, 979158.3, 993335.1, 1474883.6, 1377606.3,
    1491469.7, 1584296.9, 1596951.1, 755148.1,
];

pub fn emission_series() -> BTreeMap<String, Vec<f64>> {
    BTreeMap::from([
        ("2024".to_string(), EMISSIONS_2024.to_vec()),
        ("2025".to_string(), EMISSIONS_2025.to_vec()),
    ])
}

/// CO2 report series. The 2024 export carries a thirteenth value past December.
pub const REPORT_2023: [f64; 12] = [
    984874.4, 932615.3, 1191542.7, 932291.5, 1194252.1, 1114543.6, 1254592.8, 1204459.1,
    1099238.6, 1079290.3, 1164020.6, 629683.2,
];

pub const REPORT_2024: [f64; 13] = [
    968872.6, 1130021.6, 816632.0, 618007.5, 606818.7, 861412.6, 620495.1, 635648.9, 576067.0,
    1310736.3, 1193778.3, 614303.3, 690519.5,
];

pub const ACCIDENTS: ([f64; 12], [f64; 12]) = (
    [6.0, 7.0, 3.0, 4.0, 4.0, 5.0, 6.0, 7.0, 5.0, 5.0, 0.0, 1.0],
    [1.0, 5.0, 3.0, 1.0, 0.0, 3.0, 1.0, 3.0, 3.0, 4.0, 5.0, 2.0],
);

pub const BLOWOUTS: ([f64; 12], [f64; 12]) = (
    [2.0, 3.0, 5.0, 7.0, 0.0, 1.0, 0.0, 4.0, 0.0, 1.0, 2.0, 0.0],
    [2.0, 1.0, 4.0, 4.0, 0.0, 0.0, 3.0, 0.0, 1.0, 1.0, 1.0, 3.0],
);

pub const SPILLS: ([f64; 12], [f64; 12]) = (
    [1.0, 3.0, 1.0, 2.0, 1.0, 0.0, 3.0, 1.0, 1.0, 2.0, 1.0, 0.0],
    [2.0, 3.0, 0.0, 0.0, 2.0, 1.0, 1.0, 0.0, 0.0, 3.0, 1.0, 2.0],
);

pub fn fallback_vehicles() -> Vec<VehicleRecord> {
    let vehicle = |fleet: &str, hr: &str, make: &str, tr: &str, trailer: &str, km: &str| {
        VehicleRecord {
            fleet_number: fleet.to_string(),
            horse_reg: hr.to_string(),
            horse_make: make.to_string(),
            trailer_reg: tr.to_string(),
            trailer_make: trailer.to_string(),
            current_mileage: km.to_string(),
            image_filename: format!("{fleet}.jpg"),
        }
    };
    vec![
        vehicle("EV1", "KXB413MP", "FM-E", "", "", "3584"),
        vehicle("F150", "JBN 851 MP", "Volvo FM 330", "KZX 167 MP", "Unipower", "1130625"),
        vehicle("F153", "JBN 838 MP", "Volvo FM 330", "HYP 896 MP", "Unipower", "1040478"),
        vehicle("F158", "JBS 576 MP", "Volvo FM 330", "HYG 484 MP", "Lohr", "1073005"),
    ]
}

const OPERATIONS_FALLBACK_CSV: &str = "\
Month,SpeedingOccurrences,ShiftHours,Accidents,LonghaulKm,LocalKm,TotalKm
January,14,5120,1,301200,98400,399600
February,11,4870,5,287900,91300,379200
March,9,5230,3,322400,101800,424200
";

pub fn fallback_operations() -> MonthlyDataset {
    monthly_metrics_from_csv(OPERATIONS_FALLBACK_CSV).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_sets_are_complete() {
        assert_eq!(fallback_vehicles().len(), 4);
        let ops = fallback_operations();
        assert_eq!(ops.months.len(), 3);
        assert_eq!(ops.months[1].accidents, 5.0);
        assert_eq!(ops.months[2].total_km, 424200.0);
        assert_eq!(ops.total("Accidents"), 9.0);
    }
}
