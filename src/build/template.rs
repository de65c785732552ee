//! Framework project templates. Each template expands into directories,
//! starter files, dependencies and package scripts, and from there into an
//! ordinary [`BuildPlan`].

use super::plan::chain_groups;
use super::step::{BuildPlan, BuildStep, StepAction, ValidationRule};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectTemplate {
    Python,
    FastApi,
    Django,
    React,
    NextJs,
}

impl ProjectTemplate {
    pub const ALL: [ProjectTemplate; 5] = [
        ProjectTemplate::Python,
        ProjectTemplate::FastApi,
        ProjectTemplate::Django,
        ProjectTemplate::React,
        ProjectTemplate::NextJs,
    ];

    /// Lookup key, also the serialized form.
    pub fn key(&self) -> &'static str {
        match self {
            ProjectTemplate::Python => "python",
            ProjectTemplate::FastApi => "fastapi",
            ProjectTemplate::Django => "django",
            ProjectTemplate::React => "react",
            ProjectTemplate::NextJs => "nextjs",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProjectTemplate::Python => "Python",
            ProjectTemplate::FastApi => "FastAPI",
            ProjectTemplate::Django => "Django",
            ProjectTemplate::React => "React",
            ProjectTemplate::NextJs => "Next.js",
        }
    }

    /// Package manager the dependencies are installed with.
    pub fn manager(&self) -> &'static str {
        match self {
            ProjectTemplate::Python | ProjectTemplate::FastApi | ProjectTemplate::Django => "pip",
            ProjectTemplate::React | ProjectTemplate::NextJs => "npm",
        }
    }

    fn is_node(&self) -> bool {
        self.manager() == "npm"
    }

    pub fn runtime_dependencies(&self) -> &'static [&'static str] {
        match self {
            ProjectTemplate::Python => &["click>=8.0.0", "loguru>=0.7.0", "python-dotenv>=1.0.0"],
            ProjectTemplate::FastApi => &[
                "fastapi>=0.100.0",
                "uvicorn>=0.23.0",
                "pydantic>=2.0.0",
                "python-dotenv>=1.0.0",
            ],
            ProjectTemplate::Django => &[
                "django>=4.2.0",
                "djangorestframework>=3.14.0",
                "python-dotenv>=1.0.0",
            ],
            ProjectTemplate::React => &[
                "react@latest",
                "react-dom@latest",
                "@types/react@latest",
                "@types/react-dom@latest",
                "typescript@latest",
            ],
            ProjectTemplate::NextJs => &[
                "next@latest",
                "react@latest",
                "react-dom@latest",
                "@types/node@latest",
                "@types/react@latest",
                "@types/react-dom@latest",
                "typescript@latest",
            ],
        }
    }

    pub fn dev_dependencies(&self) -> &'static [&'static str] {
        match self {
            ProjectTemplate::Python => &["pytest>=7.0.0", "black>=23.0.0", "flake8>=6.0.0", "mypy>=1.0.0"],
            ProjectTemplate::FastApi => &["pytest>=7.0.0", "httpx>=0.24.0", "black>=23.0.0"],
            ProjectTemplate::Django => &["pytest-django>=4.5.0", "black>=23.0.0", "flake8>=6.0.0"],
            ProjectTemplate::React => &[
                "@vitejs/plugin-react@latest",
                "vite@latest",
                "eslint@latest",
                "eslint-plugin-react-hooks@latest",
            ],
            ProjectTemplate::NextJs => &[
                "eslint@latest",
                "eslint-config-next@latest",
                "tailwindcss@latest",
                "postcss@latest",
                "autoprefixer@latest",
            ],
        }
    }

    /// `package.json` scripts; empty for Python templates.
    pub fn scripts(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProjectTemplate::React => &[
                ("dev", "vite"),
                ("build", "tsc && vite build"),
                ("lint", "eslint . --ext ts,tsx"),
                ("preview", "vite preview"),
            ],
            ProjectTemplate::NextJs => &[
                ("dev", "next dev"),
                ("build", "next build"),
                ("start", "next start"),
                ("lint", "next lint"),
            ],
            _ => &[],
        }
    }

    /// File every scaffold of this template must contain.
    pub fn manifest(&self) -> &'static str {
        if self.is_node() {
            "package.json"
        } else {
            "requirements.txt"
        }
    }

    pub fn directories(&self, project: &str) -> Vec<String> {
        let module = module_name(project);
        match self {
            ProjectTemplate::Python => vec![module, "tests".into(), "docs".into()],
            ProjectTemplate::FastApi => {
                vec!["app".into(), "app/api".into(), "app/models".into(), "tests".into()]
            }
            ProjectTemplate::Django => vec![
                format!("{}/apps", module),
                "static".into(),
                "media".into(),
                "templates".into(),
            ],
            ProjectTemplate::React => vec!["src".into(), "public".into()],
            ProjectTemplate::NextJs => vec![
                "src/app".into(),
                "src/components/ui".into(),
                "src/lib".into(),
                "public".into(),
            ],
        }
    }

    /// Starter files as `(path, content)` pairs, manifest first.
    pub fn files(&self, project: &str) -> Vec<(String, String)> {
        let module = module_name(project);
        let mut files = vec![(self.manifest().to_string(), self.manifest_content(project))];

        match self {
            ProjectTemplate::Python => {
                files.push(("requirements-dev.txt".into(), self.dev_dependencies().join("\n")));
                files.push((
                    "main.py".into(),
                    format!("from {module}.cli import main\n\nif __name__ == \"__main__\":\n    main()\n"),
                ));
                files.push((format!("{module}/__init__.py"), "__version__ = \"0.1.0\"\n".into()));
                files.push((
                    format!("{module}/cli.py"),
                    "import click\n\n\n@click.command()\n@click.option(\"--name\", default=\"World\")\n\
                     def main(name):\n    click.echo(f\"Hello, {name}!\")\n"
                        .into(),
                ));
                files.push(("tests/__init__.py".into(), String::new()));
                files.push((
                    "tests/test_main.py".into(),
                    format!(
                        "from click.testing import CliRunner\n\nfrom {module}.cli import main\n\n\n\
                         def test_greets():\n    result = CliRunner().invoke(main, [\"--name\", \"Ada\"])\n    \
                         assert \"Hello, Ada!\" in result.output\n"
                    ),
                ));
                files.push((".env.example".into(), "LOG_LEVEL=INFO\n".into()));
            }
            ProjectTemplate::FastApi => {
                files.push(("requirements-dev.txt".into(), self.dev_dependencies().join("\n")));
                files.push((
                    "main.py".into(),
                    format!(
                        "from fastapi import FastAPI\n\napp = FastAPI(title=\"{project}\")\n\n\n\
                         @app.get(\"/health\")\ndef health():\n    return {{\"status\": \"ok\"}}\n"
                    ),
                ));
                files.push(("app/__init__.py".into(), String::new()));
                files.push(("app/api/__init__.py".into(), String::new()));
                files.push(("app/models/__init__.py".into(), String::new()));
                files.push((
                    "tests/test_health.py".into(),
                    "from fastapi.testclient import TestClient\n\nfrom main import app\n\n\n\
                     def test_health():\n    assert TestClient(app).get(\"/health\").json() == {\"status\": \"ok\"}\n"
                        .into(),
                ));
            }
            ProjectTemplate::Django => {
                files.push(("requirements-dev.txt".into(), self.dev_dependencies().join("\n")));
                files.push((
                    "manage.py".into(),
                    format!(
                        "#!/usr/bin/env python\nimport os\nimport sys\n\n\
                         if __name__ == \"__main__\":\n    \
                         os.environ.setdefault(\"DJANGO_SETTINGS_MODULE\", \"{module}.settings\")\n    \
                         from django.core.management import execute_from_command_line\n\n    \
                         execute_from_command_line(sys.argv)\n"
                    ),
                ));
                files.push((format!("{module}/__init__.py"), String::new()));
                files.push((
                    format!("{module}/settings.py"),
                    format!(
                        "import os\n\nSECRET_KEY = os.environ.get(\"SECRET_KEY\", \"change-me\")\n\
                         DEBUG = os.environ.get(\"DEBUG\", \"0\") == \"1\"\nROOT_URLCONF = \"{module}.urls\"\n\
                         INSTALLED_APPS = [\"django.contrib.contenttypes\", \"rest_framework\"]\n"
                    ),
                ));
                files.push((format!("{module}/urls.py"), "urlpatterns = []\n".into()));
            }
            ProjectTemplate::React => {
                files.push((
                    "index.html".into(),
                    format!(
                        "<!doctype html>\n<html lang=\"en\">\n  <head><title>{project}</title></head>\n  \
                         <body>\n    <div id=\"root\"></div>\n    \
                         <script type=\"module\" src=\"/src/main.tsx\"></script>\n  </body>\n</html>\n"
                    ),
                ));
                files.push((
                    "vite.config.ts".into(),
                    "import { defineConfig } from 'vite'\nimport react from '@vitejs/plugin-react'\n\n\
                     export default defineConfig({ plugins: [react()] })\n"
                        .into(),
                ));
                files.push(("tsconfig.json".into(), tsconfig()));
                files.push((
                    "src/main.tsx".into(),
                    "import React from 'react'\nimport ReactDOM from 'react-dom/client'\nimport App from './App'\n\n\
                     ReactDOM.createRoot(document.getElementById('root')!).render(<App />)\n"
                        .into(),
                ));
                files.push((
                    "src/App.tsx".into(),
                    format!("export default function App() {{\n  return <h1>{project}</h1>\n}}\n"),
                ));
            }
            ProjectTemplate::NextJs => {
                files.push((
                    "next.config.js".into(),
                    "/** @type {import('next').NextConfig} */\nmodule.exports = { reactStrictMode: true }\n".into(),
                ));
                files.push(("tsconfig.json".into(), tsconfig()));
                files.push((
                    "src/app/layout.tsx".into(),
                    format!(
                        "import './globals.css'\n\nexport const metadata = {{ title: '{project}' }}\n\n\
                         export default function RootLayout({{ children }}: {{ children: React.ReactNode }}) {{\n  \
                         return <html lang=\"en\"><body>{{children}}</body></html>\n}}\n"
                    ),
                ));
                files.push((
                    "src/app/page.tsx".into(),
                    format!("export default function Home() {{\n  return <main>{project}</main>\n}}\n"),
                ));
                files.push((
                    "src/app/globals.css".into(),
                    "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n".into(),
                ));
                files.push((
                    "src/lib/utils.ts".into(),
                    "export function cn(...classes: string[]) {\n  return classes.filter(Boolean).join(' ')\n}\n"
                        .into(),
                ));
            }
        }

        files.push((".gitignore".into(), self.gitignore().join("\n")));
        files.push(("README.md".into(), self.readme(project)));
        files
    }

    fn manifest_content(&self, project: &str) -> String {
        if !self.is_node() {
            return self.runtime_dependencies().join("\n");
        }
        let dependencies: serde_json::Map<String, serde_json::Value> = self
            .runtime_dependencies()
            .iter()
            .map(|d| split_version(d))
            .map(|(name, version)| (name.to_string(), json!(version)))
            .collect();
        let dev_dependencies: serde_json::Map<String, serde_json::Value> = self
            .dev_dependencies()
            .iter()
            .map(|d| split_version(d))
            .map(|(name, version)| (name.to_string(), json!(version)))
            .collect();
        let scripts: serde_json::Map<String, serde_json::Value> = self
            .scripts()
            .iter()
            .map(|(name, command)| (name.to_string(), json!(command)))
            .collect();
        let manifest = json!({
            "name": project,
            "version": "0.1.0",
            "private": true,
            "scripts": scripts,
            "dependencies": dependencies,
            "devDependencies": dev_dependencies,
        });
        serde_json::to_string_pretty(&manifest).unwrap_or_default()
    }

    fn gitignore(&self) -> &'static [&'static str] {
        if self.is_node() {
            &["node_modules/", "dist/", ".next/", ".env", "*.log"]
        } else {
            &["__pycache__/", "*.pyc", ".venv/", ".env", ".pytest_cache/"]
        }
    }

    fn readme(&self, project: &str) -> String {
        let setup: &[&str] = match self {
            ProjectTemplate::React | ProjectTemplate::NextJs => {
                &["Install dependencies: `npm install`", "Start the dev server: `npm run dev`"]
            }
            ProjectTemplate::FastApi => &[
                "Install dependencies: `pip install -r requirements.txt`",
                "Start the server: `uvicorn main:app --reload`",
            ],
            ProjectTemplate::Django => &[
                "Install dependencies: `pip install -r requirements.txt`",
                "Start the server: `python manage.py runserver`",
            ],
            ProjectTemplate::Python => &[
                "Install dependencies: `pip install -r requirements.txt`",
                "Run: `python main.py --name World`",
            ],
        };
        let mut lines = vec![
            format!("# {}", project),
            String::new(),
            format!("{} project.", self.name()),
            String::new(),
            "## Setup".to_string(),
            String::new(),
        ];
        lines.extend(setup.iter().enumerate().map(|(i, s)| format!("{}. {}", i + 1, s)));
        lines.push(String::new());
        lines.join("\n")
    }

    /// Scaffold plan: directories, then files, then (when `install` is set)
    /// one install step per runtime dependency. The manifest is checked
    /// after the build.
    pub fn plan(&self, project: &str, install: bool) -> BuildPlan {
        let directories = self
            .directories(project)
            .into_iter()
            .enumerate()
            .map(|(i, dir)| {
                let description = format!("Create directory {}", dir);
                BuildStep::create_dir(format!("dir-{}", i + 1), dir).with_description(description)
            })
            .collect();
        let files = self
            .files(project)
            .into_iter()
            .enumerate()
            .map(|(i, (path, content))| {
                let description = format!("Write {}", path);
                BuildStep::write_file(format!("file-{}", i + 1), path, content).with_description(description)
            })
            .collect();
        let dependencies = if install {
            self.runtime_dependencies()
                .iter()
                .enumerate()
                .map(|(i, package)| {
                    BuildStep::new(
                        format!("dep-{}", i + 1),
                        StepAction::InstallDependency {
                            package: package.to_string(),
                            manager: Some(self.manager().to_string()),
                            command: None,
                        },
                    )
                    .with_description(format!("Install {}", package))
                    .with_retries(1)
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut plan = BuildPlan::new(project, chain_groups(vec![directories, files, dependencies]))
            .with_validation(
                ValidationRule::FileExists {
                    path: self.manifest().to_string(),
                },
                true,
            );
        plan.description = format!("{} project scaffold", self.name());
        plan
    }
}

impl fmt::Display for ProjectTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProjectTemplate {
    type Err = String;

    /// Case-insensitive; `.`, `-` and `_` are ignored and a key contained in
    /// the name (or the other way round) also matches, so `Next.js` and
    /// `fastapi-service` resolve.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let needle: String = name
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | '_' | ' '))
            .collect();
        if needle.is_empty() {
            return Err("empty project template name".to_string());
        }
        Self::ALL
            .iter()
            .find(|t| t.key() == needle)
            .or_else(|| {
                Self::ALL
                    .iter()
                    .find(|t| needle.contains(t.key()) || t.key().contains(needle.as_str()))
            })
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|t| t.key()).collect();
                format!("unknown project template '{}' (known: {})", name, known.join(", "))
            })
    }
}

/// Python-safe identifier for `project`.
fn module_name(project: &str) -> String {
    let module: String = project
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if module.is_empty() || module.starts_with(|c: char| c.is_ascii_digit()) {
        format!("app_{}", module)
    } else {
        module
    }
}

/// `@scope/pkg@1.2` -> (`@scope/pkg`, `1.2`); no version means `latest`.
fn split_version(spec: &str) -> (&str, &str) {
    match spec.rfind('@') {
        Some(at) if at > 0 => (&spec[..at], &spec[at + 1..]),
        _ => (spec, "latest"),
    }
}

fn tsconfig() -> String {
    let config = json!({
        "compilerOptions": {
            "target": "ES2020",
            "lib": ["DOM", "DOM.Iterable", "ES2020"],
            "module": "ESNext",
            "moduleResolution": "bundler",
            "jsx": "react-jsx",
            "strict": true,
            "noEmit": true
        },
        "include": ["src"]
    });
    serde_json::to_string_pretty(&config).unwrap_or_default()
}
