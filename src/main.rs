use clap::Parser;
use std::sync::Arc;
use yolo_detect_server::{
    adapters::{
        fs::image_store::FsImageStore,
        http::{router, state::HttpState},
        onnx::model_catalog::OnnxModelCatalog,
    },
    application::{
        ports::{ImageStorePort, ModelHandle},
        services::DetectionService,
    },
    config::AppConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::parse();

    // 1. Inicializar logs (RUST_LOG=info por defecto)
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    // 2. Almacenes de imágenes
    let uploads = Arc::new(FsImageStore::new(&config.upload_dir));
    let outputs = Arc::new(FsImageStore::new(&config.output_dir));
    uploads.ensure()?;
    outputs.ensure()?;
    tracing::info!(
        "📁 Subidas en {}, salidas en {}",
        config.upload_dir.display(),
        config.output_dir.display()
    );

    // 3. Modelo: un fallo deja el servicio arrancado en modo degradado
    let labels = config.class_labels();
    let catalog = OnnxModelCatalog::new(config.font_path.clone());
    let model = ModelHandle::initialize(&catalog, &config.model_id(), &config.yolo_params(), &labels).await;
    if let ModelHandle::Unavailable { reason } = &model {
        tracing::warn!("⚠️ /predict responderá 500 hasta reiniciar con un modelo válido: {}", reason);
    }

    let detection = Arc::new(DetectionService::new(model, labels, uploads, outputs));
    let state = HttpState { detection };

    let app = router(state, config.max_upload_bytes);

    // 4. Lanzar el Servidor
    let addr = config.bind_addr();
    tracing::info!("🚀 Servidor YOLO iniciado en http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
