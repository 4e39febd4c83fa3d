use std::path::PathBuf;
use tracing::debug;

use crate::assets::AssetPool;
use crate::error::{CompositionWarning, PlaybackError};

/// Un silencio sintetizado a insertar en la secuencia final
#[derive(Debug, Clone, PartialEq)]
pub struct SilenceGap {
    /// Duración en segundos
    pub duration: f64,
    /// Posición en la secuencia final combinada
    pub index: usize,
}

/// Resultado del parseo de los tokens de una combinación
#[derive(Debug, Default)]
pub struct ComboSpec {
    pub assets: Vec<PathBuf>,
    pub gaps: Vec<SilenceGap>,
    pub warnings: Vec<CompositionWarning>,
}

/// Invocación del decodificador producida por el compositor
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    /// Un solo asset: no hace falta filter graph
    Single(PathBuf),
    /// Entrada principal + opciones con las entradas extra y el grafo
    Graph { input: PathBuf, post_options: String },
}

/// Parsea la gramática de combinación contra el pool de assets.
///
/// `-<número>` es un silencio de esos segundos; `<entero>-` convierte
/// BPM a segundos (60/bpm); cualquier otro token se busca como nombre de
/// asset. Los tokens inválidos generan advertencias pero no abortan.
pub fn parse_combo_tokens(tokens: &[&str], pool: &AssetPool) -> ComboSpec {
    let mut spec = ComboSpec::default();

    for raw in tokens {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }

        // posición que ocuparía el próximo elemento en la secuencia final
        let position = spec.assets.len() + spec.gaps.len();

        if token != "-" {
            if let Some(rest) = token.strip_prefix('-') {
                match rest.parse::<f64>() {
                    Ok(duration) if duration > 0.0 => {
                        spec.gaps.push(SilenceGap {
                            duration,
                            index: position,
                        });
                    }
                    _ => spec.warnings.push(CompositionWarning::InvalidSilence {
                        token: token.to_owned(),
                    }),
                }
                continue;
            }

            if let Some(rest) = token.strip_suffix('-') {
                // un sufijo no numérico cae a la búsqueda por nombre
                if let Ok(bpm) = rest.parse::<i64>() {
                    if bpm <= 0 {
                        spec.warnings.push(CompositionWarning::NonPositiveBpm {
                            token: token.to_owned(),
                        });
                    } else {
                        spec.gaps.push(SilenceGap {
                            duration: 60.0 / bpm as f64,
                            index: position,
                        });
                    }
                    continue;
                }
            }
        }

        match pool.search(token) {
            Some(path) => spec.assets.push(path),
            None => spec.warnings.push(CompositionWarning::UnknownAsset {
                name: token.to_owned(),
            }),
        }
    }

    spec
}

/// Construye una única invocación del decodificador que concatena los
/// assets con los silencios insertados en sus posiciones finales.
///
/// Cada silencio se declara como sub-stream `aevalsrc` con etiqueta
/// propia; las etiquetas de assets y silencios se concatenan en el orden
/// de la secuencia final y el stream resultante se mapea como única
/// salida de audio.
pub fn compose(assets: &[PathBuf], gaps: &[SilenceGap]) -> Result<Composition, PlaybackError> {
    let Some(first) = assets.first() else {
        return Err(PlaybackError::CompositionFailure);
    };

    if assets.len() == 1 {
        // nada que combinar
        return Ok(Composition::Single(first.clone()));
    }

    let mut options = String::new();
    let mut filter = String::from("-filter_complex \"");

    for (i, gap) in gaps.iter().enumerate() {
        filter.push_str(&format!("aevalsrc=0:d={}[s{}];", gap.duration, i));
    }

    // etiquetas de assets en orden de entrada
    let mut order: Vec<String> = vec!["[0:a:0]".to_owned()];
    for (i, asset) in assets.iter().skip(1).enumerate() {
        options.push_str(&format!("-i \"{}\" ", asset.display()));
        order.push(format!("[{}:a:0]", i + 1));
    }

    // cada silencio se inserta sobre la secuencia que va creciendo, en
    // el orden en que fue declarado
    for (i, gap) in gaps.iter().enumerate() {
        let at = gap.index.min(order.len());
        order.insert(at, format!("[s{i}]"));
    }

    filter.push_str(&order.join(" "));
    options.push_str(&filter);
    options.push_str(&format!(
        " concat=n={}:v=0:a=1 [a]\" -map \"[a]\"",
        order.len()
    ));

    debug!("🎛️ Composición de {} elementos: {}", order.len(), options);
    Ok(Composition::Graph {
        input: first.clone(),
        post_options: options,
    })
}
