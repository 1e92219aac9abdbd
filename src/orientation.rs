use serde::{Deserialize, Serialize};

/// Supported device orientations of the generated application.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
  Portrait,
  Landscape,
  PortraitFlipped,
  LandscapeFlipped,
  PortraitEither,
  LandscapeEither,
  Multidirectional,
  Omnidirectional
}

impl Default for Orientation {
  fn default() -> Self { Orientation::Landscape }
}

impl Orientation {
  /// Value of the `UISupportedInterfaceOrientations` build settings, quoted
  /// when it lists several orientations.
  pub fn apple(self) -> &'static str {
    match self {
      Orientation::Portrait         => "UIInterfaceOrientationPortrait",
      Orientation::Landscape        => "UIInterfaceOrientationLandscapeRight",
      Orientation::PortraitFlipped  => "UIInterfaceOrientationPortraitUpsideDown",
      Orientation::LandscapeFlipped => "UIInterfaceOrientationLandscapeLeft",
      Orientation::PortraitEither   => "\"UIInterfaceOrientationPortrait UIInterfaceOrientationPortraitUpsideDown\"",
      Orientation::LandscapeEither  => "\"UIInterfaceOrientationLandscapeRight UIInterfaceOrientationLandscapeLeft\"",
      Orientation::Multidirectional => "\"UIInterfaceOrientationPortrait UIInterfaceOrientationLandscapeRight\"",
      Orientation::Omnidirectional  => concat!(
        "\"UIInterfaceOrientationPortrait UIInterfaceOrientationLandscapeRight ",
        "UIInterfaceOrientationLandscapeLeft UIInterfaceOrientationPortraitUpsideDown\"")
    }
  }

  /// Value of `android:screenOrientation` in the manifest.
  pub fn android(self) -> &'static str {
    match self {
      Orientation::Portrait         => "portrait",
      Orientation::Landscape        => "landscape",
      Orientation::PortraitFlipped  => "reversePortrait",
      Orientation::LandscapeFlipped => "reverseLandscape",
      Orientation::PortraitEither   => "sensorPortrait",
      Orientation::LandscapeEither  => "sensorLandscape",
      Orientation::Multidirectional => "sensor",
      Orientation::Omnidirectional  => "fullSensor"
    }
  }

  /// Portrait applications launch with the portrait storyboard on iOS.
  pub fn is_portrait(self) -> bool {
    match self {
      Orientation::Portrait        |
      Orientation::PortraitFlipped |
      Orientation::PortraitEither  => true,
      _                            => false
    }
  }
}
