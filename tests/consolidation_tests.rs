//! Consolidation over a harvested directory tree
use crt_harvest_lib::application::ConsolidationEngine;
use crt_harvest_lib::domain::Dimension;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(base: &Path, relative: &str, content: &str) {
    let path = base.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn category_files_merge_with_period_columns() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();
    write(
        base,
        "ProduccionTotalTequila/2001-ProduccionTotalTequila/2001-02-ProduccionTotalTequila.csv",
        "Produccion\n\nSubCategoria,Year,Valor\n100% Agave,2001,\"2,000\"\n",
    );
    write(
        base,
        "ProduccionTotalTequila/2001-ProduccionTotalTequila/2001-01-ProduccionTotalTequila.csv",
        "SubCategoria,Year,Valor\nTequila,2001,1500.5\n",
    );
    write(
        base,
        "ProduccionTotalTequila/2002-ProduccionTotalTequila/2002-01-ProduccionTotalTequila.csv",
        "sin encabezado\n",
    );

    let summary = ConsolidationEngine::new(base)
        .consolidate(Dimension::Production)
        .unwrap()
        .expect("output written");

    assert_eq!(summary.files_read, 2);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.output_path, base.join("consolidado_producciontotaltequila.csv"));

    let bytes = fs::read(&summary.output_path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "SubCategoria,Year,Valor,AñoArchivo,Mes");
    assert_eq!(lines[1], "Tequila,2001,1500.5,2001,1");
    assert_eq!(lines[2], "100% Agave,2001,2000.0,2001,2");
}

#[test]
fn country_files_get_descriptive_columns() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();
    write(
        base,
        "2000-ExportacionesPais/2000-02-ExportacionesPais.csv",
        "Exportaciones\nFebrero 2000\n\
         NombrePais,textbox11,Categoria,textbox14,Clase,textbox17\n\
         Japon,\"1,000\",Tequila,800,Blanco,\n",
    );

    let summary = ConsolidationEngine::new(base)
        .consolidate(Dimension::ExportsByCountry)
        .unwrap()
        .expect("output written");

    assert_eq!(summary.output_path, base.join("consolidado_exportaciones_pais.csv"));
    let text = fs::read_to_string(&summary.output_path).unwrap();
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("NombrePais,Total_Pais_Mes,Categoria,Total_Categoria_Mes,Clase,Litros 40 % Alc. Vol,AñoArchivo,Mes")
    );
    assert_eq!(lines.next(), Some("Japon,1000.0,Tequila,800.0,Blanco,0.0,2000,2"));
}

#[test]
fn consolidate_all_only_reports_dimensions_with_data() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();
    write(
        base,
        "ConsumodeAgaveTotal/1995-ConsumodeAgaveTotal/1995-12-ConsumodeAgaveTotal.csv",
        "SubCategoria,Year,Valor\nAgave,1995,10\n",
    );
    write(
        base,
        "ConsumodeAgaveTotal/2026-ConsumodeAgaveTotal/2026-01-ConsumodeAgaveTotal.csv",
        "SubCategoria,Year,Valor\nAgave,2026,10\n",
    );

    let summaries = ConsolidationEngine::new(base).consolidate_all().unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].dimension, Dimension::AgaveConsumption);
    assert_eq!(summaries[0].rows_written, 1);
}
