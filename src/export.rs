// export.rs — SQL insert statements and the tabular/CSV view

use serde::Serialize;
use serde_json::Number;
use uuid::Uuid;

use crate::geometry::{self, Position};
use crate::store::{Hotspot, HotspotFile};

const CAMERA_SETTINGS_JSON: &str = r#"{"default": {"fov": 90}, "version": 1}"#;
const DEFAULT_CAMERA_ROTATION_JSON: &str = r#"{"X":0,"Y":0,"Z":0,"W":1}"#;
const OFFSET_ROTATION_JSON: &str = r#"{"X":0,"Y":0,"Z":0}"#;

const IMAGE_EXTENSIONS: [&str; 5] = ["webp", "jpg", "jpeg", "png", "bmp"];

pub const CSV_HEADER: &str = "Title,Sphere X,Sphere Y,Sphere Z,Pixel X,Pixel Y,Pixel Z";

#[derive(Serialize)]
struct PositionJson {
    #[serde(rename = "X")]
    x: Number,
    #[serde(rename = "Y")]
    y: Number,
    #[serde(rename = "Z")]
    z: Number,
}

/// Integral values print without a fraction (`1`, not `1.0`).
fn json_number(v: f64) -> Number {
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        // exact: |v| < 2^53
        Number::from(v as i64)
    } else {
        Number::from_f64(v).unwrap_or_else(|| Number::from(0))
    }
}

/// Raw position as `{"X":..,"Y":..,"Z":..}`, unconverted.
pub fn position_json(position: Position) -> String {
    let json = PositionJson {
        x: json_number(position.x),
        y: json_number(position.y),
        z: json_number(position.z),
    };
    serde_json::to_string(&json).unwrap_or_default()
}

fn replace_non_word(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// File name without a known image extension, with every character outside
/// `[A-Za-z0-9_]` replaced by `_`.
pub fn sanitize_file_base(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) => stem,
        _ => file_name,
    };
    replace_non_word(stem)
}

/// Title with whitespace runs collapsed to `_`, then sanitized like file names.
pub fn sanitize_title(title: &str) -> String {
    let mut collapsed = String::with_capacity(title.len());
    let mut in_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_space {
                collapsed.push('_');
            }
            in_space = true;
        } else {
            collapsed.push(c);
            in_space = false;
        }
    }
    replace_non_word(&collapsed)
}

pub fn hotspot_name(file_name: &str, title: &str) -> String {
    format!("{}_{}", sanitize_file_base(file_name), sanitize_title(title))
}

fn sql_quote(s: &str) -> String {
    s.replace('\'', "''")
}

fn insert_statement(group_id: &str, index: usize, id: Uuid, file: &HotspotFile, hotspot: &Hotspot) -> String {
    format!(
        concat!(
            r#"insert into "Hotspots" ("CameraSettingsJson", "DefaultCameraRotationJson", "HotspotGroupId", "HotspotIndex", "Id", "IsExplorable", "IsVisible", "MediaThumbnailUrl", "MediaThumbnailVersion", "MediaUrl", "MediaVersion", "Name", "OffsetRotationJson", "PositionJson") "#,
            "values ('{camera}', '{rotation}', '{group}', {index}, '{id}', true, true, '', 1, '{media}', 1, '{name}', '{offset}', '{position}');"
        ),
        camera = CAMERA_SETTINGS_JSON,
        rotation = DEFAULT_CAMERA_ROTATION_JSON,
        group = sql_quote(group_id),
        index = index,
        id = id,
        media = sql_quote(&format!("/{}", file.file_name)),
        name = hotspot_name(&file.file_name, &hotspot.title),
        offset = OFFSET_ROTATION_JSON,
        position = position_json(hotspot.position),
    )
}

/// One insert per hotspot across all files in load order, separated by a
/// blank line. An empty group id yields an empty string.
pub fn generate_sql(files: &[HotspotFile], group_id: &str) -> String {
    generate_sql_with_ids(files, group_id, Uuid::new_v4)
}

/// [`generate_sql`] with a caller-supplied row id generator.
pub fn generate_sql_with_ids(files: &[HotspotFile], group_id: &str, mut next_id: impl FnMut() -> Uuid) -> String {
    let group_id = group_id.trim();
    if group_id.is_empty() {
        return String::new();
    }

    let statements: Vec<String> = files
        .iter()
        .flat_map(|file| file.hotspots.iter().map(move |h| (file, h)))
        .enumerate()
        .map(|(index, (file, hotspot))| insert_statement(group_id, index, next_id(), file, hotspot))
        .collect();

    if !statements.is_empty() {
        log::info!("generated {} insert statements for group {group_id}", statements.len());
    }
    statements.join("\n\n")
}

/// A row of the tabular view.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub title: String,
    pub raw: Position,
    pub pixel: geometry::PixelPoint,
}

/// Rows for every hotspot of `file`, with the pixel form derived from the
/// file's coordinate space and canonical dimensions.
pub fn table_rows(file: &HotspotFile) -> Vec<TableRow> {
    file.hotspots
        .iter()
        .map(|h| TableRow {
            title: h.title.clone(),
            raw: h.position,
            pixel: geometry::to_pixel(h.position, file.space, file.equirect),
        })
        .collect()
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// CSV text of the tabular view: header plus one line per row, numbers
/// formatted as displayed (2 decimals raw, 0 decimals pixel).
pub fn to_csv(rows: &[TableRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    for row in rows {
        out.push('\n');
        out.push_str(&format!(
            "{},{:.2},{:.2},{:.2},{:.0},{:.0},{:.0}",
            csv_field(&row.title),
            row.raw.x,
            row.raw.y,
            row.raw.z,
            row.pixel.px,
            row.pixel.py,
            row.pixel.pz,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CoordinateSpace, EquirectDims};
    use crate::resource::HandleLedger;
    use crate::store::HotspotStore;
    use pretty_assertions::assert_eq;

    fn store(ledger: &HandleLedger, files: &[(&str, &[(&str, Position)])]) -> HotspotStore {
        let mut store = HotspotStore::new();
        for (name, hotspots) in files {
            let id = store.add_file(*name, ledger.acquire_empty(name, (6000, 3000)), CoordinateSpace::Sphere, EquirectDims::CANONICAL);
            for (title, position) in *hotspots {
                let h = store.add_hotspot(id).unwrap();
                store.rename(h.id, title);
                store.move_hotspot(h.id, *position);
            }
        }
        store
    }

    #[test]
    fn single_hotspot_statement() {
        let ledger = HandleLedger::new();
        let s = store(&ledger, &[("room.jpg", &[("Door A", Position::new(1.0, 2.0, 3.0))])]);
        let row_id = Uuid::nil();
        let sql = generate_sql_with_ids(s.files(), "g1", || row_id);

        let expected = concat!(
            r#"insert into "Hotspots" ("CameraSettingsJson", "DefaultCameraRotationJson", "HotspotGroupId", "HotspotIndex", "Id", "IsExplorable", "IsVisible", "MediaThumbnailUrl", "MediaThumbnailVersion", "MediaUrl", "MediaVersion", "Name", "OffsetRotationJson", "PositionJson") "#,
            r#"values ('{"default": {"fov": 90}, "version": 1}', '{"X":0,"Y":0,"Z":0,"W":1}', 'g1', 0, '00000000-0000-0000-0000-000000000000', true, true, '', 1, '/room.jpg', 1, 'room_Door_A', '{"X":0,"Y":0,"Z":0}', '{"X":1,"Y":2,"Z":3}');"#
        );
        assert_eq!(sql, expected);
    }

    #[test]
    fn empty_group_id_produces_nothing() {
        let ledger = HandleLedger::new();
        let s = store(&ledger, &[("room.jpg", &[("A", Position::default()), ("B", Position::default())])]);
        assert_eq!(generate_sql(s.files(), ""), "");
        assert_eq!(generate_sql(s.files(), "   "), "");
    }

    #[test]
    fn no_hotspots_produces_nothing() {
        let ledger = HandleLedger::new();
        let s = store(&ledger, &[("room.jpg", &[])]);
        assert_eq!(generate_sql(s.files(), "g1"), "");
    }

    #[test]
    fn index_runs_across_files_and_ids_are_fresh() {
        let ledger = HandleLedger::new();
        let s = store(
            &ledger,
            &[
                ("a.jpg", &[("One", Position::default()), ("Two", Position::default())]),
                ("b.webp", &[("Three", Position::default())]),
            ],
        );
        let sql = generate_sql(s.files(), "g");
        let statements: Vec<&str> = sql.split("\n\n").collect();
        assert_eq!(statements.len(), 3);
        for (i, stmt) in statements.iter().enumerate() {
            assert!(stmt.contains(&format!("'g', {i}, '")), "{stmt}");
        }
        assert!(statements[2].contains("'/b.webp'"));
        assert!(statements[2].contains("'b_Three'"));

        let ids: std::collections::HashSet<Uuid> = statements
            .iter()
            .enumerate()
            .map(|(i, stmt)| {
                let marker = format!("'g', {i}, '");
                let start = stmt.find(&marker).unwrap() + marker.len();
                Uuid::parse_str(&stmt[start..start + 36]).unwrap()
            })
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn group_id_quotes_are_escaped() {
        let ledger = HandleLedger::new();
        let s = store(&ledger, &[("r.jpg", &[("A", Position::default())])]);
        let sql = generate_sql(s.files(), "o'brien");
        assert!(sql.contains("'o''brien'"));
    }

    #[test]
    fn file_base_sanitization() {
        assert_eq!(sanitize_file_base("room.jpg"), "room");
        assert_eq!(sanitize_file_base("Lobby Main.JPEG"), "Lobby_Main");
        assert_eq!(sanitize_file_base("pano-01.webp"), "pano_01");
        assert_eq!(sanitize_file_base("archive.tar.gz"), "archive_tar_gz");
        assert_eq!(sanitize_file_base("noext"), "noext");
    }

    #[test]
    fn title_sanitization() {
        assert_eq!(sanitize_title("Door A"), "Door_A");
        assert_eq!(sanitize_title("Door   A\tB"), "Door_A_B");
        assert_eq!(sanitize_title("Exit (north)"), "Exit__north_");
        assert_eq!(hotspot_name("room.jpg", "Door A"), "room_Door_A");
    }

    #[test]
    fn fractional_positions_keep_precision() {
        assert_eq!(position_json(Position::new(0.5, -1.25, 3.0)), r#"{"X":0.5,"Y":-1.25,"Z":3}"#);
        assert_eq!(position_json(Position::new(-0.0, 0.0, 0.0)), r#"{"X":0,"Y":0,"Z":0}"#);
    }

    #[test]
    fn table_rows_project_sphere_positions() {
        let ledger = HandleLedger::new();
        let s = store(&ledger, &[("room.jpg", &[("Ahead", Position::new(0.0, 0.0, -4.0))])]);
        let rows = table_rows(s.active_file().unwrap());
        assert_eq!(rows.len(), 1);
        assert!((rows[0].pixel.px - 3000.0).abs() < 1e-6);
        assert!((rows[0].pixel.py - 1500.0).abs() < 1e-6);
        assert_eq!(rows[0].pixel.pz, 0.0);
    }

    #[test]
    fn table_rows_pass_pixel_positions_through() {
        let ledger = HandleLedger::new();
        let mut s = HotspotStore::new();
        let id = s.add_file("plan.png", ledger.acquire_empty("plan.png", (800, 600)), CoordinateSpace::Pixel, EquirectDims::CANONICAL);
        s.add_hotspot(id);
        let rows = table_rows(s.active_file().unwrap());
        assert_eq!(rows[0].pixel.px, 100.0);
        assert_eq!(rows[0].pixel.py, 100.0);
    }

    #[test]
    fn csv_layout() {
        let rows = vec![
            TableRow {
                title: "Door A".into(),
                raw: Position::new(0.0, 0.0, -4.0),
                pixel: geometry::PixelPoint { px: 3000.0, py: 1500.0, pz: 0.0 },
            },
            TableRow {
                title: "Hall, \"east\"".into(),
                raw: Position::new(1.234, 2.0, 3.0),
                pixel: geometry::PixelPoint { px: 10.6, py: 0.2, pz: 0.0 },
            },
        ];
        let expected = "Title,Sphere X,Sphere Y,Sphere Z,Pixel X,Pixel Y,Pixel Z\n\
                        Door A,0.00,0.00,-4.00,3000,1500,0\n\
                        \"Hall, \"\"east\"\"\",1.23,2.00,3.00,11,0,0";
        assert_eq!(to_csv(&rows), expected);
    }

    #[test]
    fn csv_of_nothing_is_header_only() {
        assert_eq!(to_csv(&[]), CSV_HEADER);
    }
}
