//! Shared fixtures for opinion-etl integration tests

#![allow(dead_code)]

use opinion_etl::config::DatabaseSettings;
use opinion_etl::store::SqlStore;
use opinion_etl::Settings;
use std::path::Path;

pub const CLIENTS: &str = "\
IdCliente,Nombre,Email
1,  ana lopez , Ana@Example.COM
2,BO DIAZ,bo@example.com
2,bo diaz,Bo@Example.com
";

pub const PRODUCTS: &str = "\
IdProducto,Nombre,Categoría
10,Laptop,Electrónica
";

pub const SOURCES: &str = "\
IdFuente,TipoFuente,FechaCarga
1,Encuesta,2024-01-15
";

/// One row references a known client and product, the others do not
pub const SURVEYS: &str = "\
IdOpinion,IdCliente,IdProducto,Fecha,Comentario,Clasificacion,PuntajeSatisfaccion,FuenteTexto
1,1,10,2024-02-01,Muy bueno,Positiva,5,Encuesta
2,3,10,2024-02-02,Regular,Neutra,3,Encuesta
3,1,99,2024-02-03,Malo,Negativa,1,Encuesta
4,3,99,2024-02-04,Pésimo,Negativa,1,Encuesta
";

pub const SOCIAL: &str = "\
IdComment,IdCliente,IdProducto,Fuente,Fecha,Comentario
1,2,10,Twitter,2024-03-01,Me encanta
2,,10,Instagram,2024-03-02,Sin cliente
";

pub const REVIEWS: &str = "\
IdReview,IdCliente,IdProducto,Fecha,Comentario,Rating
1,1,10,2024-04-01,Excelente,5
2,2,10,2024-04-02,Bien,4
";

pub fn write_source(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).unwrap();
}

/// Write every source file of the default registry
pub fn write_all_sources(dir: &Path) {
    write_source(dir, "clients.csv", CLIENTS);
    write_source(dir, "products.csv", PRODUCTS);
    write_source(dir, "fuente_datos.csv", SOURCES);
    write_source(dir, "surveys_part1.csv", SURVEYS);
    write_source(dir, "social_comments.csv", SOCIAL);
    write_source(dir, "web_reviews.csv", REVIEWS);
}

pub fn settings_for(dir: &Path) -> Settings {
    Settings {
        data_dir: dir.to_path_buf(),
        ..Settings::default()
    }
}

/// Private in-memory SQLite store
pub async fn memory_store() -> SqlStore {
    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        connect_timeout_secs: 5,
        max_connections: 1,
    };
    SqlStore::connect(&settings).await.unwrap()
}
